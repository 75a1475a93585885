//! Raw-inflate engines and the registry that resolves them by name.
//!
//! Engines differ in speed, never in output: the same compressed bytes
//! inflate to the same plain bytes whichever engine is picked.
//!
//! ## Registry lifecycle
//!
//! [`Registry::global`] is built on first use and never torn down. Every
//! [`Registry::resolve`] call hands out a fresh [`BackendHandle`], so the
//! framing memo it carries lives exactly as long as one extraction run.

mod zlib;

#[cfg(feature = "miniz-oxide")]
mod miniz;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::{Error, Result};
use crate::zip::CompressionMethod;

/// Name of the always-available engine.
pub const BASELINE: &str = "zlib";

/// Environment variable naming the default engine of [`Registry::global`].
pub const BACKEND_ENV: &str = "ASYNC_UNZIP_BACKEND";

/// Output scratch size used while probing framing.
const PROBE_SCRATCH: usize = 32 * 1024;

/// Stream framing an inflater expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framing {
    /// Headerless deflate, as stored in ZIP entries.
    Raw,
    /// Deflate wrapped in a zlib header and adler32 trailer.
    Zlib,
}

/// Progress of a single [`Inflate::inflate`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InflateStatus {
    pub consumed: usize,
    pub produced: usize,
    /// The end of the deflate stream was reached.
    pub finished: bool,
}

impl InflateStatus {
    pub fn made_progress(&self) -> bool {
        self.consumed > 0 || self.produced > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InflateError(pub String);

/// One streaming inflate session.
pub trait Inflate: Send {
    /// Feed `input` and write into `output`.
    ///
    /// Consumes as much input as output space allows. Calling again with
    /// empty input drains output still held by the engine.
    fn inflate(&mut self, input: &[u8], output: &mut [u8]) -> std::result::Result<InflateStatus, InflateError>;
}

/// A raw-deflate implementation.
pub trait Engine: Send + Sync {
    fn name(&self) -> &'static str;

    fn inflater(&self, framing: Framing) -> Box<dyn Inflate>;
}

/// A resolved engine plus its per-method framing memo.
pub struct BackendHandle {
    engine: Arc<dyn Engine>,
    framing: Mutex<HashMap<CompressionMethod, Framing>>,
}

impl BackendHandle {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            framing: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn inflater(&self, framing: Framing) -> Box<dyn Inflate> {
        self.engine.inflater(framing)
    }

    pub fn cached_framing(&self, method: CompressionMethod) -> Option<Framing> {
        self.framing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&method)
            .copied()
    }

    /// Framing for `method`, probing `sample` on first use.
    ///
    /// Concurrent first callers may each probe, but only the first result is
    /// stored and every caller gets the stored value.
    pub fn framing_for(
        &self,
        method: CompressionMethod,
        sample: &[u8],
    ) -> std::result::Result<Framing, InflateError> {
        if let Some(framing) = self.cached_framing(method) {
            return Ok(framing);
        }

        let probed = self.probe(sample)?;
        let mut memo = self.framing.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(*memo.entry(method).or_insert(probed))
    }

    fn probe(&self, sample: &[u8]) -> std::result::Result<Framing, InflateError> {
        let mut scratch = vec![0u8; PROBE_SCRATCH];
        let mut last_err = InflateError("empty deflate stream".into());

        'framing: for framing in [Framing::Raw, Framing::Zlib] {
            let mut inflater = self.engine.inflater(framing);
            let mut pos = 0;
            loop {
                match inflater.inflate(&sample[pos..], &mut scratch) {
                    Ok(status) => {
                        pos += status.consumed;
                        if status.finished || !status.made_progress() || pos == sample.len() {
                            tracing::trace!(engine = self.name(), ?framing, "framing probe accepted");
                            return Ok(framing);
                        }
                    }
                    Err(err) => {
                        tracing::trace!(engine = self.name(), ?framing, %err, "framing probe rejected");
                        last_err = err;
                        continue 'framing;
                    }
                }
            }
        }

        Err(last_err)
    }
}

/// Maps engine names to engines.
pub struct Registry {
    engines: Vec<Arc<dyn Engine>>,
    default: Option<String>,
    prefer_accelerators: bool,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Registry of every engine compiled into this build, baseline first.
    pub fn new() -> Self {
        let mut engines: Vec<Arc<dyn Engine>> = vec![Arc::new(zlib::Zlib)];
        #[cfg(feature = "miniz-oxide")]
        engines.push(Arc::new(miniz::MinizOxide));

        Self {
            engines,
            default: None,
            prefer_accelerators: false,
        }
    }

    /// The process-wide registry. Its default comes from [`BACKEND_ENV`].
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let registry = Registry::new();
            match std::env::var(BACKEND_ENV) {
                Ok(name) if !name.trim().is_empty() => registry.with_default(name.trim()),
                _ => registry,
            }
        })
    }

    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default = Some(name.into());
        self
    }

    /// Resolve unnamed requests to the first accelerator when one exists.
    pub fn prefer_accelerators(mut self, prefer: bool) -> Self {
        self.prefer_accelerators = prefer;
        self
    }

    /// Names of the engines this registry can resolve.
    pub fn available(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Resolve `name`, or the configured default chain when `None`.
    ///
    /// The chain is: configured default, then the first accelerator when
    /// accelerators are preferred, then [`BASELINE`]. Each call returns a new
    /// handle with an empty framing memo.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<BackendHandle>> {
        let engine = match name.or(self.default.as_deref()) {
            Some(name) => self.find(name).ok_or_else(|| Error::UnsupportedBackend {
                name: name.to_string(),
                available: self.available().join(", "),
            })?,
            None => {
                let accelerator = self
                    .prefer_accelerators
                    .then(|| self.engines.iter().find(|e| e.name() != BASELINE))
                    .flatten();
                match accelerator {
                    Some(engine) => engine,
                    None => self.find(BASELINE).ok_or_else(|| Error::UnsupportedBackend {
                        name: BASELINE.to_string(),
                        available: self.available().join(", "),
                    })?,
                }
            }
        };

        Ok(Arc::new(BackendHandle::new(engine.clone())))
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Engine>> {
        let wanted = name.trim().to_ascii_lowercase().replace('_', "-");
        self.engines.iter().find(|e| e.name() == wanted)
    }
}
