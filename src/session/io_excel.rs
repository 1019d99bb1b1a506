use crate::session::{io_common::*, *};

use calamine::{open_workbook, DataType, Reader, Xlsx};

/// Reads the catalog from an Excel workbook.
///
/// The first row is the header. Without a worksheet name, the first worksheet is used.
pub fn read_excel_catalog(
    path: &str,
    worksheet_name: Option<&str>,
) -> SessionResult<Vec<ParsedOutlet>> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let wrange = match worksheet_name {
        Some(name) => workbook.worksheet_range(name),
        None => workbook.worksheet_range_at(0),
    }
    .context(EmptyExcelSnafu { path })?
    .context(OpeningExcelSnafu { path })?;

    let mut iter = wrange.rows();
    let header: Vec<String> = match iter.next() {
        Some(row) => row
            .iter()
            .map(|cell| read_cell(cell, 1))
            .collect::<SessionResult<Vec<String>>>()?,
        None => return EmptyExcelSnafu { path }.fail(),
    };
    debug!("read_excel_catalog: header: {:?}", header);
    let columns = CatalogColumns::from_header(&header, path)?;

    let mut res: Vec<ParsedOutlet> = Vec::new();
    for (idx, row) in iter.enumerate() {
        let lineno = idx + 2;
        let cells: Vec<String> = row
            .iter()
            .map(|cell| read_cell(cell, lineno))
            .collect::<SessionResult<Vec<String>>>()?;
        // Fully blank rows at the end of a sheet are common.
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        match columns.parse_row(&cells) {
            Some(outlet) => {
                debug!("read_excel_catalog: lineno: {:?} outlet: {:?}", lineno, outlet);
                res.push(outlet);
            }
            None => warn!("read_excel_catalog: lineno: {:?}: dropping row", lineno),
        }
    }
    Ok(res)
}

fn read_cell(cell: &DataType, lineno: usize) -> SessionResult<String> {
    match cell {
        DataType::String(s) => Ok(s.trim().to_string()),
        DataType::Empty => Ok("".to_string()),
        _ => ExcelWrongCellTypeSnafu {
            lineno,
            content: format!("{:?}", cell),
        }
        .fail(),
    }
}
