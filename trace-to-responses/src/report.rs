//! The JSON report written for each processed trace file.
use crate::{
    classifier::{Classification, Protocol},
    normalizer::Backend,
};
use serde::Serialize;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResponseReport<'a> {
    /// Name of the trace file the report was made from.
    pub source: &'a str,
    pub protocol: &'a Protocol,
    pub backend: Backend,
    #[serde(flatten)]
    pub classification: &'a Classification,
}

impl ResponseReport<'_> {
    pub fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()
    }
}
