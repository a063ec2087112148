//! Shared decoding primitives for vendor headers.
//!
//! Two families of header are handled here:
//! - fixed-length record files (CEOS leaders, FAST headers) addressed by
//!   1-based inclusive byte windows, see [`FixedRecords`] and [`FieldSpec`];
//! - "metadata group" text files (DigitalGlobe IMD/TIL, Landsat MTL) parsed by
//!   [`parse_grouped`] into nested [`Group`]s.
use std::collections::BTreeMap;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

/// Errors raised while decoding vendor headers
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Field window {start}..{end} is invalid")]
    InvalidWindow { start: usize, end: usize },
    #[error("Field window {start}..{end} lies outside a {len} byte record")]
    OutOfRange { start: usize, end: usize, len: usize },
    #[error("Record {0} does not exist in header")]
    MissingRecord(usize),
    #[error("Header is {actual} bytes, layout requires {expected}")]
    Truncated { expected: usize, actual: usize },
    #[error("Mandatory field `{0}` is blank")]
    MissingField(String),
    #[error("Field `{field}` has unparsable value `{value}`")]
    BadValue { field: String, value: String },
    #[error("Sexagesimal value `{value}` does not match template `{template}`")]
    BadSexagesimal { value: String, template: String },
    #[error("Line {line}: {message}")]
    Syntax { line: usize, message: String },
}

/// Return the trimmed text in the 1-based, inclusive byte window `start..=end`.
pub fn read_field(record: &[u8], start: usize, end: usize) -> Result<String, DecodeError> {
    if start == 0 || end < start {
        return Err(DecodeError::InvalidWindow { start, end });
    }
    if end > record.len() {
        return Err(DecodeError::OutOfRange {
            start,
            end,
            len: record.len(),
        });
    }
    let raw = &record[start - 1..end];
    Ok(String::from_utf8_lossy(raw)
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .to_string())
}

/// Convert a sexagesimal string into signed decimal degrees.
///
/// `template` describes the layout one character per character of `value`:
/// `D` degrees, `M` minutes, `S` seconds (an explicit `.` is allowed inside the
/// seconds run, otherwise digits after the first two are decimals) and `H` the
/// hemisphere letter. Any other template character must match literally and is
/// skipped. `S` and `W` hemispheres yield negative values.
pub fn dms_to_decimal(value: &str, template: &str) -> Result<f64, DecodeError> {
    let bad = || DecodeError::BadSexagesimal {
        value: value.to_string(),
        template: template.to_string(),
    };
    let value = value.trim();
    let chars: Vec<char> = value.chars().collect();
    let tpl: Vec<char> = template.chars().collect();
    if chars.len() != tpl.len() {
        return Err(bad());
    }

    let mut degrees = String::new();
    let mut minutes = String::new();
    let mut seconds = String::new();
    let mut hemisphere = None;
    for (c, t) in chars.iter().zip(tpl.iter()) {
        match t {
            'D' => degrees.push(*c),
            'M' => minutes.push(*c),
            'S' => seconds.push(*c),
            'H' => hemisphere = Some(c.to_ascii_uppercase()),
            _ => {}
        }
    }

    let parse_int = |s: &str| -> Result<f64, DecodeError> {
        if s.is_empty() {
            return Ok(0.0);
        }
        s.trim().parse::<u32>().map(f64::from).map_err(|_| bad())
    };
    let d = parse_int(&degrees)?;
    let m = parse_int(&minutes)?;
    let s = if seconds.is_empty() {
        0.0
    } else if seconds.contains('.') {
        seconds.trim().parse::<f64>().map_err(|_| bad())?
    } else {
        let (whole, frac) = seconds.split_at(seconds.len().min(2));
        let text = if frac.is_empty() {
            whole.to_string()
        } else {
            format!("{whole}.{frac}")
        };
        text.parse::<f64>().map_err(|_| bad())?
    };
    if m >= 60.0 || s >= 60.0 {
        return Err(bad());
    }

    let sign = match hemisphere {
        Some('S') | Some('W') => -1.0,
        Some('N') | Some('E') | None => 1.0,
        Some(_) => return Err(bad()),
    };
    Ok(sign * (d + m / 60.0 + s / 3600.0))
}

/// A header made of consecutive fixed-length records.
#[derive(Debug, Clone)]
pub struct FixedRecords {
    data: Vec<u8>,
    offsets: Vec<(usize, usize)>,
}

impl FixedRecords {
    /// Split `data` by the declared record lengths; extra trailing bytes are kept
    /// but not addressable.
    pub fn new(data: Vec<u8>, lengths: &[usize]) -> Result<Self, DecodeError> {
        let expected: usize = lengths.iter().sum();
        if data.len() < expected {
            return Err(DecodeError::Truncated {
                expected,
                actual: data.len(),
            });
        }
        let mut offsets = Vec::with_capacity(lengths.len());
        let mut pos = 0;
        for &len in lengths {
            offsets.push((pos, pos + len));
            pos += len;
        }
        Ok(Self { data, offsets })
    }

    /// Record by 1-based number
    pub fn record(&self, number: usize) -> Result<&[u8], DecodeError> {
        let (start, end) = number
            .checked_sub(1)
            .and_then(|i| self.offsets.get(i))
            .copied()
            .ok_or(DecodeError::MissingRecord(number))?;
        Ok(&self.data[start..end])
    }

    pub fn field(&self, record: usize, start: usize, end: usize) -> Result<String, DecodeError> {
        read_field(self.record(record)?, start, end)
    }

    pub fn record_count(&self) -> usize {
        self.offsets.len()
    }
}

/// How a fixed-window field is interpreted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    /// Float multiplied by the factor (unit conversion)
    Scaled(f64),
    /// Sexagesimal angle with the given template
    Sexagesimal(&'static str),
    /// Date in the given chrono format, emitted as ISO-8601
    Date(&'static str),
}

/// One entry of a format's static field map.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub record: usize,
    pub start: usize,
    pub end: usize,
    pub kind: FieldKind,
    pub mandatory: bool,
}

impl FieldSpec {
    pub const fn optional(
        name: &'static str,
        record: usize,
        start: usize,
        end: usize,
        kind: FieldKind,
    ) -> Self {
        Self {
            name,
            record,
            start,
            end,
            kind,
            mandatory: false,
        }
    }

    pub const fn mandatory(
        name: &'static str,
        record: usize,
        start: usize,
        end: usize,
        kind: FieldKind,
    ) -> Self {
        Self {
            name,
            record,
            start,
            end,
            kind,
            mandatory: true,
        }
    }
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Text(s) => s.parse().ok(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::Float(v) => Some(v.round() as i64),
            FieldValue::Text(s) => s.parse().ok(),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
        }
    }
}

fn convert(spec: &FieldSpec, raw: &str) -> Option<FieldValue> {
    match spec.kind {
        FieldKind::Text => Some(FieldValue::Text(raw.to_string())),
        FieldKind::Integer => raw.parse::<i64>().ok().map(FieldValue::Integer),
        FieldKind::Float => raw.parse::<f64>().ok().map(FieldValue::Float),
        FieldKind::Scaled(factor) => raw
            .parse::<f64>()
            .ok()
            .map(|v| FieldValue::Float(v * factor)),
        FieldKind::Sexagesimal(template) => dms_to_decimal(raw, template)
            .ok()
            .map(FieldValue::Float),
        FieldKind::Date(fmt) => NaiveDate::parse_from_str(raw, fmt)
            .ok()
            .map(|d| FieldValue::Text(d.format("%Y-%m-%d").to_string())),
    }
}

/// Apply a field map to a header.
///
/// Blank or unparsable optional fields are left out of the result; the same
/// condition on a mandatory field is an error. Windows outside the record are
/// always errors because they mean the header does not follow the layout.
pub fn decode_fields(
    records: &FixedRecords,
    specs: &[FieldSpec],
) -> Result<BTreeMap<&'static str, FieldValue>, DecodeError> {
    let mut out = BTreeMap::new();
    for spec in specs {
        let raw = records.field(spec.record, spec.start, spec.end)?;
        if raw.is_empty() {
            if spec.mandatory {
                return Err(DecodeError::MissingField(spec.name.to_string()));
            }
            continue;
        }
        match convert(spec, &raw) {
            Some(value) => {
                out.insert(spec.name, value);
            }
            None if spec.mandatory => {
                return Err(DecodeError::BadValue {
                    field: spec.name.to_string(),
                    value: raw,
                });
            }
            None => debug!("Ignoring unparsable field {}: {:?}", spec.name, raw),
        }
    }
    Ok(out)
}

/// Keywords and delimiters of a grouped key/value text dialect.
#[derive(Debug, Clone, Copy)]
pub struct GroupSyntax {
    pub begin: &'static str,
    pub end: &'static str,
    pub array_open: char,
    pub array_close: char,
    pub terminator: Option<char>,
    pub end_marker: &'static str,
}

impl GroupSyntax {
    /// DigitalGlobe IMD/TIL: `BEGIN_GROUP = X` ... `END_GROUP = X`, statements end in `;`
    pub const DIGITALGLOBE: GroupSyntax = GroupSyntax {
        begin: "BEGIN_GROUP",
        end: "END_GROUP",
        array_open: '(',
        array_close: ')',
        terminator: Some(';'),
        end_marker: "END",
    };

    /// USGS ODL-like MTL: `GROUP = X` ... `END_GROUP = X`
    pub const ODL: GroupSyntax = GroupSyntax {
        begin: "GROUP",
        end: "END_GROUP",
        array_open: '(',
        array_close: ')',
        terminator: None,
        end_marker: "END",
    };
}

/// A value in a grouped text file
#[derive(Debug, Clone, PartialEq)]
pub enum GroupValue {
    Scalar(String),
    Array(Vec<String>),
}

impl GroupValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            GroupValue::Scalar(s) => Some(s),
            GroupValue::Array(_) => None,
        }
    }
}

/// One group: its own fields and child groups in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub name: String,
    pub fields: BTreeMap<String, GroupValue>,
    pub groups: Vec<Group>,
}

impl Group {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(GroupValue::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name.eq_ignore_ascii_case(name))
    }

    /// Child groups whose name starts with `prefix`
    pub fn groups_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Group> {
        self.groups
            .iter()
            .filter(move |g| g.name.to_ascii_uppercase().starts_with(prefix))
    }

    /// Depth-first search for a scalar field anywhere below this group
    pub fn find(&self, key: &str) -> Option<&str> {
        if let Some(v) = self.get(key) {
            return Some(v);
        }
        self.groups.iter().find_map(|g| g.find(key))
    }

    pub fn find_f64(&self, key: &str) -> Option<f64> {
        self.find(key).and_then(|v| v.parse().ok())
    }
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches('"').trim().to_string()
}

fn split_array(body: &str, open: char, close: char) -> Vec<String> {
    body.trim()
        .trim_start_matches(open)
        .trim_end_matches(close)
        .split(',')
        .map(unquote)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse a grouped key/value text block into a root group.
pub fn parse_grouped(text: &str, syntax: &GroupSyntax) -> Result<Group, DecodeError> {
    let mut stack: Vec<Group> = vec![Group::default()];
    let mut pending: Option<(String, String, usize)> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let mut line = raw_line.trim();
        if let Some(t) = syntax.terminator {
            line = line.trim_end_matches(t).trim_end();
        }
        if line.is_empty() {
            continue;
        }

        // Continuation of a multi-line array
        if let Some((key, mut body, start)) = pending.take() {
            body.push_str(line);
            if line.ends_with(syntax.array_close) {
                let values = split_array(&body, syntax.array_open, syntax.array_close);
                insert_field(&mut stack, key, GroupValue::Array(values));
            } else {
                pending = Some((key, body, start));
            }
            continue;
        }

        if line.eq_ignore_ascii_case(syntax.end_marker) {
            break;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(DecodeError::Syntax {
                line: line_no,
                message: format!("expected `key = value`, found `{}`", line),
            });
        };
        let key = key.trim().to_string();
        let value = value.trim();

        if key.eq_ignore_ascii_case(syntax.begin) {
            stack.push(Group {
                name: unquote(value),
                ..Group::default()
            });
        } else if key.eq_ignore_ascii_case(syntax.end) {
            if stack.len() < 2 {
                return Err(DecodeError::Syntax {
                    line: line_no,
                    message: format!("{} without matching {}", syntax.end, syntax.begin),
                });
            }
            let closed = stack.pop().unwrap_or_default();
            let name = unquote(value);
            if !name.is_empty() && !name.eq_ignore_ascii_case(&closed.name) {
                return Err(DecodeError::Syntax {
                    line: line_no,
                    message: format!("group `{}` closed as `{}`", closed.name, name),
                });
            }
            if let Some(parent) = stack.last_mut() {
                parent.groups.push(closed);
            }
        } else if value.starts_with(syntax.array_open) {
            if value.ends_with(syntax.array_close) {
                let values = split_array(value, syntax.array_open, syntax.array_close);
                insert_field(&mut stack, key, GroupValue::Array(values));
            } else {
                pending = Some((key, value.to_string(), line_no));
            }
        } else {
            insert_field(&mut stack, key, GroupValue::Scalar(unquote(value)));
        }
    }

    if let Some((key, _, start)) = pending {
        return Err(DecodeError::Syntax {
            line: start,
            message: format!("unterminated array value for `{}`", key),
        });
    }
    // Tolerate files that stop before closing their outer groups
    while stack.len() > 1 {
        let closed = stack.pop().unwrap_or_default();
        if let Some(parent) = stack.last_mut() {
            parent.groups.push(closed);
        }
    }
    Ok(stack.pop().unwrap_or_default())
}

fn insert_field(stack: &mut [Group], key: String, value: GroupValue) {
    if let Some(current) = stack.last_mut() {
        current.fields.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(len: usize, fields: &[(usize, &str)]) -> Vec<u8> {
        let mut buf = vec![b' '; len];
        for (start, text) in fields {
            buf[start - 1..start - 1 + text.len()].copy_from_slice(text.as_bytes());
        }
        buf
    }

    #[test]
    fn read_field_trims_and_uses_one_based_windows() {
        let rec = b"ABCD  ALOS    xyz";
        assert_eq!(read_field(rec, 1, 4).unwrap(), "ABCD");
        assert_eq!(read_field(rec, 5, 14).unwrap(), "ALOS");
        assert_eq!(read_field(rec, 5, 6).unwrap(), "");
    }

    #[test]
    fn read_field_rejects_bad_windows() {
        let rec = b"0123456789";
        assert!(matches!(
            read_field(rec, 0, 3),
            Err(DecodeError::InvalidWindow { .. })
        ));
        assert!(matches!(
            read_field(rec, 5, 4),
            Err(DecodeError::InvalidWindow { .. })
        ));
        assert!(matches!(
            read_field(rec, 8, 11),
            Err(DecodeError::OutOfRange { len: 10, .. })
        ));
    }

    #[test]
    fn sexagesimal_boundaries() {
        let t = "DDDMMSSSSSSSH";
        assert_eq!(dms_to_decimal("0000000.0000N", t).unwrap(), 0.0);
        assert_eq!(dms_to_decimal("0900000.0000S", t).unwrap(), -90.0);
        let v = dms_to_decimal("1795959.0000E", t).unwrap();
        assert!((v - 179.999_722_222).abs() < 1e-8);
    }

    #[test]
    fn sexagesimal_implied_decimals_and_west() {
        let v = dms_to_decimal("0723149.2358W", "DDDMMSSSSSSSH").unwrap();
        let expected = -(72.0 + 31.0 / 60.0 + 49.2358 / 3600.0);
        assert!((v - expected).abs() < 1e-9);

        let implied = dms_to_decimal("402536012N", "DDMMSSSSSH").unwrap();
        let expected = 40.0 + 25.0 / 60.0 + 36.012 / 3600.0;
        assert!((implied - expected).abs() < 1e-9);
    }

    #[test]
    fn sexagesimal_rejects_mismatched_input() {
        assert!(dms_to_decimal("12345", "DDDMMSSSSSSSH").is_err());
        assert!(dms_to_decimal("0006100.0000N", "DDDMMSSSSSSSH").is_err());
        assert!(dms_to_decimal("0000000.0000X", "DDDMMSSSSSSSH").is_err());
    }

    #[test]
    fn fixed_records_split_and_truncation() {
        let mut data = record_with(10, &[(1, "FIRST")]);
        data.extend(record_with(20, &[(3, "SECOND")]));
        let recs = FixedRecords::new(data.clone(), &[10, 20]).unwrap();
        assert_eq!(recs.record_count(), 2);
        assert_eq!(recs.field(1, 1, 5).unwrap(), "FIRST");
        assert_eq!(recs.field(2, 3, 8).unwrap(), "SECOND");
        assert!(matches!(recs.record(3), Err(DecodeError::MissingRecord(3))));

        assert!(matches!(
            FixedRecords::new(data, &[10, 30]),
            Err(DecodeError::Truncated { expected: 40, .. })
        ));
    }

    #[test]
    fn decode_fields_skips_optional_and_enforces_mandatory() {
        let data = record_with(40, &[(1, "ALOS"), (11, "12.5"), (21, "abc"), (31, "20070115")]);
        let recs = FixedRecords::new(data, &[40]).unwrap();
        let specs = [
            FieldSpec::mandatory("satellite", 1, 1, 10, FieldKind::Text),
            FieldSpec::optional("angle", 1, 11, 20, FieldKind::Scaled(2.0)),
            FieldSpec::optional("broken", 1, 21, 30, FieldKind::Float),
            FieldSpec::optional("date", 1, 31, 40, FieldKind::Date("%Y%m%d")),
        ];
        let out = decode_fields(&recs, &specs).unwrap();
        assert_eq!(out["satellite"], FieldValue::Text("ALOS".into()));
        assert_eq!(out["angle"].as_f64(), Some(25.0));
        assert!(!out.contains_key("broken"));
        assert_eq!(out["date"], FieldValue::Text("2007-01-15".into()));

        let strict = [FieldSpec::mandatory("broken", 1, 21, 30, FieldKind::Float)];
        assert!(matches!(
            decode_fields(&recs, &strict),
            Err(DecodeError::BadValue { .. })
        ));
        let blank = record_with(40, &[]);
        let recs = FixedRecords::new(blank, &[40]).unwrap();
        assert!(matches!(
            decode_fields(&recs, &specs),
            Err(DecodeError::MissingField(_))
        ));
    }

    #[test]
    fn grouped_text_with_terminators_and_arrays() {
        let text = r#"version = "AA";
numTiles = 2;
bandId = "Multi";
BEGIN_GROUP = IMAGE_1
	satId = "QB02";
	cloudCover = 0.125;
	bandList = (
		"BAND_B",
		"BAND_G"
	);
END_GROUP = IMAGE_1
BEGIN_GROUP = TILE_1
	filename = "a_R1C1.TIF";
	codes = ( 1, 2, 3 );
END_GROUP = TILE_1
END;
"#;
        let root = parse_grouped(text, &GroupSyntax::DIGITALGLOBE).unwrap();
        assert_eq!(root.get("version"), Some("AA"));
        assert_eq!(root.get("numTiles"), Some("2"));
        let image = root.group("IMAGE_1").unwrap();
        assert_eq!(image.get("satId"), Some("QB02"));
        assert_eq!(image.get_f64("cloudCover"), Some(0.125));
        assert_eq!(
            image.fields["bandList"],
            GroupValue::Array(vec!["BAND_B".into(), "BAND_G".into()])
        );
        let tile = root.group("TILE_1").unwrap();
        assert_eq!(
            tile.fields["codes"],
            GroupValue::Array(vec!["1".into(), "2".into(), "3".into()])
        );
        assert_eq!(root.find("filename"), Some("a_R1C1.TIF"));
        assert_eq!(root.groups_with_prefix("TILE_").count(), 1);
    }

    #[test]
    fn grouped_text_nested_odl() {
        let text = "GROUP = L1_METADATA_FILE\n  GROUP = PRODUCT_METADATA\n    SPACECRAFT_ID = \"LANDSAT_8\"\n  END_GROUP = PRODUCT_METADATA\n  GROUP = IMAGE_ATTRIBUTES\n    CLOUD_COVER = 12.34\n  END_GROUP = IMAGE_ATTRIBUTES\nEND_GROUP = L1_METADATA_FILE\nEND\n";
        let root = parse_grouped(text, &GroupSyntax::ODL).unwrap();
        let l1 = root.group("L1_METADATA_FILE").unwrap();
        assert_eq!(l1.groups.len(), 2);
        assert_eq!(root.find("SPACECRAFT_ID"), Some("LANDSAT_8"));
        assert_eq!(root.find_f64("CLOUD_COVER"), Some(12.34));
    }

    #[test]
    fn grouped_text_reports_mismatched_groups() {
        let text = "GROUP = A\nEND_GROUP = B\n";
        assert!(matches!(
            parse_grouped(text, &GroupSyntax::ODL),
            Err(DecodeError::Syntax { line: 2, .. })
        ));
        let text = "GROUP = A\n  KEY = (1,\n";
        assert!(matches!(
            parse_grouped(text, &GroupSyntax::ODL),
            Err(DecodeError::Syntax { line: 2, .. })
        ));
    }
}
