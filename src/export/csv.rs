use super::row::{MissionRow, HEADERS};
use crate::error::{Error, Result};

pub fn encode_csv(rows: &[MissionRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADERS)?;
    for row in rows {
        writer.write_record(row.cells().iter().map(|c| c.to_text()))?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::Export(format!("csv: {}", e.error())))
}
