use crate::session::*;

/// One row of a catalog file, before it is checked.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ParsedOutlet {
    pub codename: String,
    pub name: String,
    pub kind: String,
    pub pic: Option<String>,
}

/// The positions of the catalog columns, read from the header.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct CatalogColumns {
    pub codename: usize,
    pub name: usize,
    pub kind: usize,
    pub pic: Option<usize>,
    pub width: usize,
}

impl CatalogColumns {
    pub fn from_header(header: &[String], path: &str) -> SessionResult<CatalogColumns> {
        let find = |column: &str| header.iter().position(|h| h.trim() == column);
        let required = |column: &str| {
            find(column).context(MissingColumnSnafu {
                column,
                path: path.to_string(),
            })
        };
        Ok(CatalogColumns {
            codename: required("codename")?,
            name: required("name")?,
            kind: required("type")?,
            pic: find("pic"),
            width: header.len(),
        })
    }

    /// None if the row does not have as many fields as the header.
    pub fn parse_row(&self, row: &[String]) -> Option<ParsedOutlet> {
        if row.len() != self.width {
            return None;
        }
        Some(ParsedOutlet {
            codename: row[self.codename].clone(),
            name: row[self.name].clone(),
            kind: row[self.kind].clone(),
            pic: self.pic.map(|idx| row[idx].clone()),
        })
    }
}

pub fn build_catalog(rows: &[ParsedOutlet], config: &SurveyConfig) -> SessionResult<OutletCatalog> {
    let mut builder = CatalogBuilder::new(config);
    let mut kept = 0;
    for row in rows.iter() {
        if builder.add_outlet(&row.codename, &row.name, &row.kind, row.pic.as_deref()) {
            kept += 1;
        }
    }
    info!("build_catalog: {} outlets out of {} rows", kept, rows.len());
    builder.build().context(CatalogSnafu {})
}

/// Reads the catalog described by the source.
pub fn read_catalog(
    path: &Path,
    source: &CatalogSource,
    config: &SurveyConfig,
) -> SessionResult<OutletCatalog> {
    let path_s = path.display().to_string();
    info!("read_catalog: {} ({})", path_s, source.provider);
    let rows = match source.provider.as_str() {
        "csv" => io_csv::read_csv_catalog(&path_s)?,
        "xlsx" | "excel" => {
            io_excel::read_excel_catalog(&path_s, source.excel_worksheet_name.as_deref())?
        }
        x => {
            return UnknownProviderSnafu {
                provider: x.to_string(),
            }
            .fail();
        }
    };
    build_catalog(&rows, config)
}
