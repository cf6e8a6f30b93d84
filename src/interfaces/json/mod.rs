//! JSON in, JSON out: how the command line reads a dispatch input and reports its outcome.

pub mod input_reader;
pub mod outcome_writer;
