use crate::domain::request::DispatchInput;
use crate::error::InputError;
use std::io::Read;

/// Reads one [`DispatchInput`] document from any `Read` source (e.g. File, Stdin).
pub struct InputReader<R: Read> {
    source: R,
}

impl<R: Read> InputReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn read(self) -> Result<DispatchInput, InputError> {
        Ok(serde_json::from_reader(self.source)?)
    }
}
