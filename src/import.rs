use std::collections::BTreeMap;
use std::io::Cursor;

use calamine::{Data, Range, Reader, Xls, Xlsx};

/// Source format of an uploaded reference file, chosen from the file name
/// alone. Content never changes the routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Excel,
}

impl SourceFormat {
    pub fn label(self) -> &'static str {
        match self {
            SourceFormat::Csv => "CSV",
            SourceFormat::Excel => "EXCEL",
        }
    }
}

pub fn detect_format(file_name: &str) -> SourceFormat {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "xlsx" | "xls" => SourceFormat::Excel,
        _ => SourceFormat::Csv,
    }
}

/// Canonical district attributes that header synonyms resolve to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    NcesId,
    StateLeaId,
    Name,
    State,
    StateName,
    Address,
    City,
    Zip,
    Zip4,
    Phone,
    Website,
    LeaType,
    LeaTypeText,
    CharterLea,
    OperationalStatus,
    OperationalStatusText,
    LowestGrade,
    HighestGrade,
    OperationalSchools,
}

/// Accepted header spellings, uppercased with underscores. Federal exports,
/// state exports and hand-edited sheets disagree on almost every column name.
const HEADER_SYNONYMS: &[(&str, Field)] = &[
    ("LEAID", Field::NcesId),
    ("LEA_ID", Field::NcesId),
    ("NCES_ID", Field::NcesId),
    ("NCESID", Field::NcesId),
    ("DISTRICT_ID", Field::NcesId),
    ("ST_LEAID", Field::StateLeaId),
    ("ST_LEA_ID", Field::StateLeaId),
    ("STATE_LEA_ID", Field::StateLeaId),
    ("LEA_NAME", Field::Name),
    ("NAME", Field::Name),
    ("DISTRICT_NAME", Field::Name),
    ("DISTRICT", Field::Name),
    ("ST", Field::State),
    ("STATE", Field::State),
    ("STATE_ABBR", Field::State),
    ("ST_NAME", Field::StateName),
    ("STATE_NAME", Field::StateName),
    ("LSTREET1", Field::Address),
    ("STREET", Field::Address),
    ("ADDRESS", Field::Address),
    ("STREET_ADDRESS", Field::Address),
    ("LCITY", Field::City),
    ("CITY", Field::City),
    ("LZIP", Field::Zip),
    ("ZIP", Field::Zip),
    ("ZIP_CODE", Field::Zip),
    ("ZIPCODE", Field::Zip),
    ("LZIP4", Field::Zip4),
    ("ZIP4", Field::Zip4),
    ("PHONE", Field::Phone),
    ("PHONE_NUMBER", Field::Phone),
    ("TELEPHONE", Field::Phone),
    ("WEBSITE", Field::Website),
    ("WEB_SITE", Field::Website),
    ("URL", Field::Website),
    ("LEA_TYPE", Field::LeaType),
    ("LEA_TYPE_TEXT", Field::LeaTypeText),
    ("CHARTER_LEA", Field::CharterLea),
    ("CHARTER", Field::CharterLea),
    ("SY_STATUS", Field::OperationalStatus),
    ("OPERATIONAL_STATUS", Field::OperationalStatus),
    ("UPDATED_STATUS", Field::OperationalStatus),
    ("SY_STATUS_TEXT", Field::OperationalStatusText),
    ("OPERATIONAL_STATUS_TEXT", Field::OperationalStatusText),
    ("UPDATED_STATUS_TEXT", Field::OperationalStatusText),
    ("GSLO", Field::LowestGrade),
    ("LOWEST_GRADE", Field::LowestGrade),
    ("LOW_GRADE", Field::LowestGrade),
    ("GSHI", Field::HighestGrade),
    ("HIGHEST_GRADE", Field::HighestGrade),
    ("HIGH_GRADE", Field::HighestGrade),
    ("OPERATIONAL_SCHOOLS", Field::OperationalSchools),
    ("SCH", Field::OperationalSchools),
    ("NUM_SCHOOLS", Field::OperationalSchools),
    ("SCHOOL_COUNT", Field::OperationalSchools),
    ("SCHOOLS", Field::OperationalSchools),
];

fn lookup_synonym(key: &str) -> Option<Field> {
    HEADER_SYNONYMS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, f)| *f)
}

/// Collapse internal whitespace runs to single underscores:
/// "District  ID" -> "DISTRICT_ID".
fn normalize_header_key(upper: &str) -> String {
    let mut out = String::with_capacity(upper.len());
    let mut pending_gap = false;
    for ch in upper.chars() {
        if ch.is_whitespace() {
            pending_gap = true;
            continue;
        }
        if pending_gap && !out.is_empty() {
            out.push('_');
        }
        pending_gap = false;
        out.push(ch);
    }
    out
}

/// Resolve raw header cells to a column-index -> field mapping. The raw
/// uppercased spelling is tried before the normalized one; columns matching
/// no synonym are ignored. Row assembly applies values in ascending column
/// order, so when two columns resolve to the same field the later one wins.
pub fn map_headers(headers: &[String]) -> BTreeMap<usize, Field> {
    let mut mapping = BTreeMap::new();
    for (idx, raw) in headers.iter().enumerate() {
        let upper = raw.trim().to_ascii_uppercase();
        if upper.is_empty() {
            continue;
        }
        let field =
            lookup_synonym(&upper).or_else(|| lookup_synonym(&normalize_header_key(&upper)));
        if let Some(field) = field {
            mapping.insert(idx, field);
        }
    }
    mapping
}

/// One normalized district row. Only the NCES ID is required; every other
/// attribute is best-effort.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DistrictRecord {
    pub nces_id: String,
    pub state_lea_id: Option<String>,
    pub name: Option<String>,
    pub state: Option<String>,
    pub state_name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub zip4: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub lea_type: Option<String>,
    pub lea_type_text: Option<String>,
    pub charter_lea: Option<String>,
    pub operational_status: Option<String>,
    pub operational_status_text: Option<String>,
    pub lowest_grade: Option<String>,
    pub highest_grade: Option<String>,
    pub operational_schools: i64,
}

fn non_empty(v: &str) -> Option<String> {
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

impl DistrictRecord {
    fn assign(&mut self, field: Field, value: &str) {
        let v = value.trim();
        match field {
            Field::NcesId => self.nces_id = v.to_string(),
            Field::StateLeaId => self.state_lea_id = non_empty(v),
            Field::Name => self.name = non_empty(v),
            Field::State => self.state = non_empty(v),
            Field::StateName => self.state_name = non_empty(v),
            Field::Address => self.address = non_empty(v),
            Field::City => self.city = non_empty(v),
            Field::Zip => self.zip = non_empty(v),
            Field::Zip4 => self.zip4 = non_empty(v),
            Field::Phone => self.phone = non_empty(v),
            Field::Website => self.website = non_empty(v),
            Field::LeaType => self.lea_type = non_empty(v),
            Field::LeaTypeText => self.lea_type_text = non_empty(v),
            Field::CharterLea => self.charter_lea = non_empty(v),
            Field::OperationalStatus => self.operational_status = non_empty(v),
            Field::OperationalStatusText => self.operational_status_text = non_empty(v),
            Field::LowestGrade => self.lowest_grade = non_empty(v),
            Field::HighestGrade => self.highest_grade = non_empty(v),
            Field::OperationalSchools => {
                self.operational_schools = v.parse::<i64>().unwrap_or(0)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ParsedDistricts {
    pub records: Vec<DistrictRecord>,
    /// Data rows dropped for lacking an NCES ID.
    pub skipped: usize,
}

/// Best-effort CSV record tokenizer: a quote toggles quoted mode, commas
/// split only outside quotes, doubled quotes inside a quoted field produce a
/// literal quote. Unbalanced quoting degrades by accumulating to end of line
/// instead of failing.
fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

pub fn parse_csv_text(text: &str) -> ParsedDistricts {
    let mut out = ParsedDistricts::default();
    let mut lines = text.lines();
    let Some(header_line) = lines.next() else {
        return out;
    };
    let headers = parse_csv_record(header_line);
    let mapping = map_headers(&headers);

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = parse_csv_record(line);
        let mut rec = DistrictRecord::default();
        for (idx, field) in &mapping {
            if let Some(value) = fields.get(*idx) {
                rec.assign(*field, value);
            }
        }
        if rec.nces_id.is_empty() {
            out.skipped += 1;
            continue;
        }
        out.records.push(rec);
    }
    out
}

fn first_sheet_range(bytes: &[u8]) -> Option<Range<Data>> {
    if let Ok(mut workbook) = Xlsx::new(Cursor::new(bytes)) {
        let sheet_name = workbook.sheet_names().first().cloned()?;
        return workbook.worksheet_range(&sheet_name).ok();
    }
    if let Ok(mut workbook) = Xls::new(Cursor::new(bytes)) {
        let sheet_name = workbook.sheet_names().first().cloned()?;
        return workbook.worksheet_range(&sheet_name).ok();
    }
    None
}

/// First sheet only; which of several sheets would be authoritative is
/// undefined upstream. A header-only, empty or unreadable workbook yields an
/// empty record set, never an error.
pub fn parse_workbook_bytes(bytes: &[u8]) -> ParsedDistricts {
    let Some(range) = first_sheet_range(bytes) else {
        return ParsedDistricts::default();
    };

    let mut out = ParsedDistricts::default();
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return out;
    };
    let headers: Vec<String> = header_row.iter().map(cell_to_string).collect();
    let mapping = map_headers(&headers);

    for row in rows {
        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        let mut rec = DistrictRecord::default();
        for (idx, field) in &mapping {
            let Some(cell) = row.get(*idx) else {
                continue;
            };
            if *field == Field::OperationalSchools {
                rec.operational_schools = cell_to_count(cell);
            } else {
                rec.assign(*field, &cell_to_string(cell));
            }
        }
        if rec.nces_id.is_empty() {
            out.skipped += 1;
            continue;
        }
        out.records.push(rec);
    }
    out
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        // Integral floats render without a decimal point so numeric NCES IDs
        // survive the spreadsheet round trip.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string().trim().to_string(),
    }
}

fn cell_to_count(cell: &Data) -> i64 {
    match cell {
        Data::Int(i) => *i,
        Data::Float(f) => *f as i64,
        other => cell_to_string(other).parse::<i64>().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_format_by_extension_only() {
        assert_eq!(detect_format("districts.xlsx"), SourceFormat::Excel);
        assert_eq!(detect_format("DISTRICTS.XLS"), SourceFormat::Excel);
        assert_eq!(detect_format("districts.csv"), SourceFormat::Csv);
        assert_eq!(detect_format("districts.txt"), SourceFormat::Csv);
        assert_eq!(detect_format("districts"), SourceFormat::Csv);
    }

    #[test]
    fn tokenizer_keeps_quoted_commas_together() {
        let fields = parse_csv_record("0100001,\"Springfield, IL Unified\",IL");
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1], "Springfield, IL Unified");
    }

    #[test]
    fn tokenizer_unescapes_doubled_quotes() {
        let fields = parse_csv_record("a,\"say \"\"hi\"\"\",b");
        assert_eq!(fields, vec!["a", "say \"hi\"", "b"]);
    }

    #[test]
    fn tokenizer_degrades_on_unbalanced_quote() {
        // No panic, no error: the tail accumulates into one field.
        let fields = parse_csv_record("a,\"unterminated,b");
        assert_eq!(fields, vec!["a", "unterminated,b"]);
    }

    #[test]
    fn header_mapping_accepts_spellings_and_spacing() {
        let headers: Vec<String> = vec![
            "LEAID".into(),
            " lea_name ".into(),
            "District  ID".into(),
            "Unrelated Column".into(),
        ];
        let mapping = map_headers(&headers);
        assert_eq!(mapping.get(&0), Some(&Field::NcesId));
        assert_eq!(mapping.get(&1), Some(&Field::Name));
        assert_eq!(mapping.get(&2), Some(&Field::NcesId));
        assert_eq!(mapping.get(&3), None);
    }

    #[test]
    fn csv_rows_without_key_are_dropped() {
        let text = "LEAID,LEA_NAME,ST,LCITY\n\
                    0100001,\"Springfield, IL Unified\",IL,Springfield\n\
                    ,Orphan District,TX,Austin\n\
                    0100002,Madison County Schools,WI,Madison\n";
        let parsed = parse_csv_text(text);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped, 1);

        let first = &parsed.records[0];
        assert_eq!(first.nces_id, "0100001");
        assert_eq!(first.name.as_deref(), Some("Springfield, IL Unified"));
        assert_eq!(first.state.as_deref(), Some("IL"));
        assert_eq!(first.city.as_deref(), Some("Springfield"));

        let second = &parsed.records[1];
        assert_eq!(second.nces_id, "0100002");
        assert_eq!(second.name.as_deref(), Some("Madison County Schools"));
    }

    #[test]
    fn later_duplicate_column_wins() {
        let text = "LEAID,LEA_NAME,DISTRICT_NAME\n1,Old Name,New Name\n";
        let parsed = parse_csv_text(text);
        assert_eq!(parsed.records[0].name.as_deref(), Some("New Name"));
    }

    #[test]
    fn operational_schools_defaults_to_zero() {
        let text = "LEAID,SCH\n1,seven\n2,7\n3,\n";
        let parsed = parse_csv_text(text);
        assert_eq!(parsed.records[0].operational_schools, 0);
        assert_eq!(parsed.records[1].operational_schools, 7);
        assert_eq!(parsed.records[2].operational_schools, 0);
    }

    #[test]
    fn header_only_csv_is_empty_not_an_error() {
        let parsed = parse_csv_text("LEAID,LEA_NAME,ST\n");
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.skipped, 0);
    }

    #[test]
    fn garbage_workbook_bytes_yield_empty_set() {
        let parsed = parse_workbook_bytes(b"this is not a spreadsheet");
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.skipped, 0);
    }
}
