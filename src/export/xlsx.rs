use rust_xlsxwriter::{Format, Workbook};

use super::row::{Cell, MissionRow, HEADERS};
use crate::error::Result;

const SHEET_NAME: &str = "Missions";

pub fn encode_xlsx(rows: &[MissionRow]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, header) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, cell) in row.cells().into_iter().enumerate() {
            let c = col as u16;
            match cell {
                Cell::Text(s) => {
                    worksheet.write_string(r, c, s)?;
                }
                Cell::Number(n) => {
                    worksheet.write_number(r, c, n)?;
                }
                Cell::Bool(b) => {
                    worksheet.write_boolean(r, c, b)?;
                }
                Cell::Empty => {}
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}
