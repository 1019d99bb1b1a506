// Primitives for reading catalog files in text format.

use crate::session::{io_common::*, *};

/// Reads a comma-separated catalog.
///
/// There is no quoting: a comma always separates two fields. Lines that do not have the same
/// number of fields as the header are dropped.
pub fn read_csv_catalog(path: &str) -> SessionResult<Vec<ParsedOutlet>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .quoting(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let mut records = rdr.into_records();

    let header: Vec<String> = match records.next() {
        Some(line_r) => line_r
            .context(CsvLineParseSnafu { lineno: 1_usize })?
            .iter()
            .map(|s| s.to_string())
            .collect(),
        None => return MissingColumnSnafu {
            column: "codename",
            path,
        }
        .fail(),
    };
    debug!("read_csv_catalog: header: {:?}", header);
    let columns = CatalogColumns::from_header(&header, path)?;

    let mut res: Vec<ParsedOutlet> = Vec::new();
    let mut dropped = 0;
    for (idx, line_r) in records.enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        let row: Vec<String> = line.iter().map(|s| s.to_string()).collect();
        match columns.parse_row(&row) {
            Some(outlet) => {
                debug!("read_csv_catalog: lineno: {:?} outlet: {:?}", lineno, outlet);
                res.push(outlet);
            }
            None => {
                debug!(
                    "read_csv_catalog: lineno: {:?}: dropping row with {} fields",
                    lineno,
                    row.len()
                );
                dropped += 1;
            }
        }
    }
    if dropped > 0 {
        warn!(
            "read_csv_catalog: {}: dropped {} rows that do not match the {} columns of the header",
            path, dropped, columns.width
        );
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_catalog(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn reads_rows_and_drops_mismatched_ones() {
        let f = write_catalog(
            "codename, name ,type,pic\n\
             tg1,TG1,tg,https://example.org/tg1.png\n\
             radio24, Radio 24 ,radio,\n\
             \"corriere\",Corriere, della Sera,press,\n\
             ottoemezzo,Otto e mezzo,talk\n\
             report,Report,talk,\n",
        );
        let rows = read_csv_catalog(f.path().to_str().unwrap()).unwrap();
        let codenames: Vec<&str> = rows.iter().map(|r| r.codename.as_str()).collect();
        assert_eq!(codenames, vec!["tg1", "radio24", "report"]);
        assert_eq!(rows[1].name, "Radio 24");
        assert_eq!(rows[0].pic, Some("https://example.org/tg1.png".to_string()));
    }

    #[test]
    fn quotes_are_kept_verbatim() {
        let f = write_catalog("codename,name,type\n\"la7\",La7,tg\n");
        let rows = read_csv_catalog(f.path().to_str().unwrap()).unwrap();
        assert_eq!(rows[0].codename, "\"la7\"");
        assert_eq!(rows[0].pic, None);
    }

    #[test]
    fn header_without_type() {
        let f = write_catalog("codename,name\ntg1,TG1\n");
        let res = read_csv_catalog(f.path().to_str().unwrap());
        assert!(matches!(res, Err(SessionError::MissingColumn { .. })));
    }

    #[test]
    fn missing_file() {
        let res = read_csv_catalog("/nonexistent/outlets.csv");
        assert!(matches!(res, Err(SessionError::CsvOpen { .. })));
    }

    #[test]
    fn catalog_end_to_end() {
        let f = write_catalog(
            "codename,name,type\ntg1,TG1,tg\ntg2,TG2,tg\nblog,Blog,blog\ntg1,Dup,tg\n",
        );
        let rows = read_csv_catalog(f.path().to_str().unwrap()).unwrap();
        let catalog = build_catalog(&rows, &SurveyConfig::default()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("tg1").unwrap().is_mainstream);
        assert!(!catalog.get("tg2").unwrap().is_mainstream);
    }
}
