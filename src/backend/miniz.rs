use miniz_oxide::inflate::stream::{InflateState, inflate};
use miniz_oxide::{DataFormat, MZError, MZFlush, MZStatus};

use super::{Engine, Framing, Inflate, InflateError, InflateStatus};

/// Accelerator driving `miniz_oxide`'s streaming inflater directly.
pub struct MinizOxide;

impl Engine for MinizOxide {
    fn name(&self) -> &'static str {
        "miniz-oxide"
    }

    fn inflater(&self, framing: Framing) -> Box<dyn Inflate> {
        let format = match framing {
            Framing::Raw => DataFormat::Raw,
            Framing::Zlib => DataFormat::Zlib,
        };
        Box::new(MinizInflater(InflateState::new_boxed(format)))
    }
}

struct MinizInflater(Box<InflateState>);

impl Inflate for MinizInflater {
    fn inflate(&mut self, input: &[u8], output: &mut [u8]) -> Result<InflateStatus, InflateError> {
        let result = inflate(&mut self.0, input, output, MZFlush::None);
        let finished = match result.status {
            Ok(MZStatus::StreamEnd) => true,
            Ok(_) => false,
            // No progress possible without more input or output space.
            Err(MZError::Buf) => false,
            Err(err) => return Err(InflateError(format!("miniz_oxide: {err:?}"))),
        };

        Ok(InflateStatus {
            consumed: result.bytes_consumed,
            produced: result.bytes_written,
            finished,
        })
    }
}
