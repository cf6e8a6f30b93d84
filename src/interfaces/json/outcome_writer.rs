use crate::application::registry::Registry;
use crate::domain::outcome::DispatchOutcome;
use std::io::{self, Write};

/// Writes dispatch outcomes, one pretty-printed JSON document each.
pub struct OutcomeWriter<W: Write> {
    writer: W,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_outcome(&mut self, outcome: &DispatchOutcome) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, outcome)?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    /// Lists every `resource.method` pair, one per line.
    pub fn write_registry(&mut self, registry: &Registry) -> io::Result<()> {
        for (name, resource) in registry.resources() {
            for method in resource.methods() {
                writeln!(self.writer, "{name}.{method}")?;
            }
        }
        self.writer.flush()
    }
}
