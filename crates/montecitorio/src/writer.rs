use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Pretty-prints `value` as JSON with a four-space indent and a trailing newline.
pub fn write_json_to<W: Write, T: Serialize + ?Sized>(
    mut writer: W,
    value: &T,
) -> Result<(), WriteError> {
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut writer, formatter);
    value.serialize(&mut serializer)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Writes `value` to `path`, or to standard output when no path is given.
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: Option<&Path>) -> Result<(), WriteError> {
    match path {
        Some(path) => {
            log::info!("Writing JSON to {}", path.display());
            let file = File::create(path)
                .inspect_err(|e| log::error!("Cannot create {}: {}", path.display(), e))?;
            write_json_to(BufWriter::new(file), value)
        }
        None => write_json_to(io::stdout().lock(), value),
    }
}
