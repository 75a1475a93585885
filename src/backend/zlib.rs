use flate2::{Decompress, FlushDecompress, Status};

use super::{Engine, Framing, Inflate, InflateError, InflateStatus};

/// Baseline engine backed by `flate2`.
pub struct Zlib;

impl Engine for Zlib {
    fn name(&self) -> &'static str {
        super::BASELINE
    }

    fn inflater(&self, framing: Framing) -> Box<dyn Inflate> {
        Box::new(ZlibInflater(Decompress::new(framing == Framing::Zlib)))
    }
}

struct ZlibInflater(Decompress);

impl Inflate for ZlibInflater {
    fn inflate(&mut self, input: &[u8], output: &mut [u8]) -> Result<InflateStatus, InflateError> {
        let (before_in, before_out) = (self.0.total_in(), self.0.total_out());
        let status = self
            .0
            .decompress(input, output, FlushDecompress::None)
            .map_err(|e| InflateError(e.to_string()))?;

        Ok(InflateStatus {
            consumed: (self.0.total_in() - before_in) as usize,
            produced: (self.0.total_out() - before_out) as usize,
            finished: status == Status::StreamEnd,
        })
    }
}
