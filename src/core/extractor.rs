//! Assessment roll extraction.
//!
//! Streams the XML with `quick_xml` and keeps one frame per open element.
//! When an element closes it is tested against the configured
//! [`UnitMatcher`]; matching elements become [`AssessmentUnitRecord`]s, read
//! through the [`FieldTable`].

use crate::domain::model::AssessmentUnitRecord;
use crate::utils::error::{ExplorerError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_CODE_TAG: &str = "RL0105A";
pub const DEFAULT_DWELLING_TAG: &str = "RL0311A";
pub const DEFAULT_LAND_VALUE_TAG: &str = "RL0402A";
pub const DEFAULT_BUILDING_VALUE_TAG: &str = "RL0403A";
pub const DEFAULT_ROLL_YEAR_TAG: &str = "RLM02A";
pub const DEFAULT_UNKNOWN_CODE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitField {
    ClassificationCode,
    DwellingCount,
    LandValue,
    BuildingValue,
    RollYear,
}

/// How a child's text is turned into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Trimmed text; empty counts as absent.
    Text,
    /// Non-negative integer, `0` when absent or unparsable.
    Integer,
    /// Non-negative decimal (decimal comma accepted), `0.0` when absent or unparsable.
    Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(Option<String>),
    Integer(u64),
    Decimal(f64),
}

impl ValueKind {
    pub fn parse(self, raw: Option<&str>) -> FieldValue {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty());
        match self {
            ValueKind::Text => FieldValue::Text(raw.map(str::to_string)),
            ValueKind::Integer => FieldValue::Integer(raw.and_then(parse_integer).unwrap_or(0)),
            ValueKind::Decimal => FieldValue::Decimal(
                raw.and_then(parse_decimal)
                    .filter(|v| *v >= 0.0)
                    .unwrap_or(0.0),
            ),
        }
    }
}

impl FieldValue {
    fn into_text(self) -> Option<String> {
        match self {
            FieldValue::Text(text) => text,
            FieldValue::Integer(n) => Some(n.to_string()),
            FieldValue::Decimal(v) => Some(v.to_string()),
        }
    }

    fn as_u64(&self) -> u64 {
        match self {
            FieldValue::Text(text) => text.as_deref().and_then(parse_integer).unwrap_or(0),
            FieldValue::Integer(n) => *n,
            FieldValue::Decimal(v) if v.fract() == 0.0 => *v as u64,
            FieldValue::Decimal(_) => 0,
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            FieldValue::Text(text) => text
                .as_deref()
                .and_then(parse_decimal)
                .filter(|v| *v >= 0.0)
                .unwrap_or(0.0),
            FieldValue::Integer(n) => *n as f64,
            FieldValue::Decimal(v) => *v,
        }
    }
}

/// One row of the field table: which child tag feeds which field, and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: UnitField,
    pub tag: String,
    pub kind: ValueKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTable {
    rules: Vec<FieldRule>,
}

impl Default for FieldTable {
    fn default() -> Self {
        let rule = |field, tag: &str, kind| FieldRule {
            field,
            tag: tag.to_string(),
            kind,
        };
        Self {
            rules: vec![
                rule(UnitField::ClassificationCode, DEFAULT_CODE_TAG, ValueKind::Text),
                rule(UnitField::DwellingCount, DEFAULT_DWELLING_TAG, ValueKind::Integer),
                rule(UnitField::LandValue, DEFAULT_LAND_VALUE_TAG, ValueKind::Decimal),
                rule(UnitField::BuildingValue, DEFAULT_BUILDING_VALUE_TAG, ValueKind::Decimal),
                rule(UnitField::RollYear, DEFAULT_ROLL_YEAR_TAG, ValueKind::Text),
            ],
        }
    }
}

impl FieldTable {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    /// Re-points `field` at another tag; adds a rule if the field had none.
    pub fn with_tag(mut self, field: UnitField, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        match self.rules.iter_mut().find(|r| r.field == field) {
            Some(rule) => rule.tag = tag,
            None => {
                let kind = match field {
                    UnitField::DwellingCount => ValueKind::Integer,
                    UnitField::LandValue | UnitField::BuildingValue => ValueKind::Decimal,
                    UnitField::ClassificationCode | UnitField::RollYear => ValueKind::Text,
                };
                self.rules.push(FieldRule { field, tag, kind });
            }
        }
        self
    }

    pub fn tag_for(&self, field: UnitField) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.field == field)
            .map(|r| r.tag.as_str())
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }
}

/// Decides which elements are assessable units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "tag", rename_all = "kebab-case")]
pub enum UnitMatcher {
    /// Any element with a direct child of this tag.
    HasChild(String),
    /// Any element with this tag.
    Element(String),
}

impl Default for UnitMatcher {
    fn default() -> Self {
        UnitMatcher::HasChild(DEFAULT_CODE_TAG.to_string())
    }
}

impl UnitMatcher {
    fn matches(&self, tag: &str, children: &HashMap<String, String>) -> bool {
        match self {
            UnitMatcher::HasChild(child) => children.contains_key(child),
            UnitMatcher::Element(name) => tag == name,
        }
    }
}

/// What to do with a unit whose classification code is absent or empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingCodePolicy {
    Label(String),
    Skip,
}

impl Default for MissingCodePolicy {
    fn default() -> Self {
        MissingCodePolicy::Label(DEFAULT_UNKNOWN_CODE.to_string())
    }
}

#[derive(Debug, Default)]
struct UnitDraft {
    code: Option<String>,
    dwellings: u64,
    land: f64,
    building: f64,
    roll_year: Option<String>,
}

impl UnitDraft {
    fn apply(&mut self, field: UnitField, value: FieldValue) {
        match field {
            UnitField::ClassificationCode => self.code = value.into_text(),
            UnitField::DwellingCount => self.dwellings = value.as_u64(),
            UnitField::LandValue => self.land = value.as_f64(),
            UnitField::BuildingValue => self.building = value.as_f64(),
            UnitField::RollYear => self.roll_year = value.into_text(),
        }
    }
}

struct Frame {
    tag: String,
    text: String,
    /// Direct children's trimmed text; first occurrence wins.
    children: HashMap<String, String>,
}

impl Frame {
    fn new(tag: String) -> Self {
        Self {
            tag,
            text: String::new(),
            children: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RollExtractor {
    matcher: UnitMatcher,
    fields: FieldTable,
    missing_code: MissingCodePolicy,
}

impl RollExtractor {
    pub fn new(matcher: UnitMatcher, fields: FieldTable, missing_code: MissingCodePolicy) -> Self {
        Self {
            matcher,
            fields,
            missing_code,
        }
    }

    pub fn matcher(&self) -> &UnitMatcher {
        &self.matcher
    }

    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    pub fn extract(&self, xml: &[u8]) -> Result<Vec<AssessmentUnitRecord>> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        let mut drafts: Vec<UnitDraft> = Vec::new();
        let mut root_fields: Option<HashMap<String, String>> = None;
        let mut seen_root = false;

        loop {
            let event = reader.read_event_into(&mut buf).map_err(|e| {
                ExplorerError::malformed(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                ))
            })?;

            match event {
                Event::Start(e) => {
                    if stack.is_empty() {
                        if seen_root {
                            return Err(ExplorerError::malformed(
                                "more than one root element",
                            ));
                        }
                        seen_root = true;
                    }
                    let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    stack.push(Frame::new(tag));
                }
                Event::Empty(e) => {
                    let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if stack.is_empty() {
                        if seen_root {
                            return Err(ExplorerError::malformed(
                                "more than one root element",
                            ));
                        }
                        seen_root = true;
                    }
                    self.close(Frame::new(tag), &mut stack, &mut drafts, &mut root_fields);
                }
                Event::Text(e) => {
                    let raw = e.into_inner();
                    let raw = String::from_utf8_lossy(&raw);
                    let text = quick_xml::escape::unescape(&raw)
                        .map_err(|e| ExplorerError::malformed(e.to_string()))?;
                    match stack.last_mut() {
                        Some(frame) => frame.text.push_str(&text),
                        None if text.trim().is_empty() => {}
                        None => {
                            return Err(ExplorerError::malformed(
                                "text content outside the root element",
                            ))
                        }
                    }
                }
                Event::CData(e) => {
                    let raw = e.into_inner();
                    if let Some(frame) = stack.last_mut() {
                        frame.text.push_str(&String::from_utf8_lossy(&raw));
                    }
                }
                Event::End(_) => {
                    let frame = stack
                        .pop()
                        .ok_or_else(|| ExplorerError::malformed("unexpected closing tag"))?;
                    self.close(frame, &mut stack, &mut drafts, &mut root_fields);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(ExplorerError::malformed(format!(
                "unclosed element <{}>",
                open.tag
            )));
        }
        if !seen_root {
            return Err(ExplorerError::malformed("no root element"));
        }

        let fallback_year = self
            .fields
            .tag_for(UnitField::RollYear)
            .and_then(|tag| root_fields.as_ref()?.get(tag))
            .map(|year| year.trim().to_string())
            .filter(|year| !year.is_empty());

        let total = drafts.len();
        let records: Vec<AssessmentUnitRecord> = drafts
            .into_iter()
            .filter_map(|draft| self.finish(draft, fallback_year.as_deref()))
            .collect();

        if records.len() < total {
            tracing::debug!(
                "Skipped {} units without a classification code",
                total - records.len()
            );
        }
        tracing::debug!("Extracted {} units", records.len());
        Ok(records)
    }

    fn close(
        &self,
        frame: Frame,
        stack: &mut [Frame],
        drafts: &mut Vec<UnitDraft>,
        root_fields: &mut Option<HashMap<String, String>>,
    ) {
        if self.matcher.matches(&frame.tag, &frame.children) {
            drafts.push(self.read_unit(&frame.children));
        }

        match stack.last_mut() {
            Some(parent) => {
                parent
                    .children
                    .entry(frame.tag)
                    .or_insert_with(|| frame.text.trim().to_string());
            }
            None => *root_fields = Some(frame.children),
        }
    }

    fn read_unit(&self, children: &HashMap<String, String>) -> UnitDraft {
        let mut draft = UnitDraft::default();
        for rule in self.fields.rules() {
            let raw = children.get(&rule.tag).map(String::as_str);
            draft.apply(rule.field, rule.kind.parse(raw));
        }
        draft
    }

    fn finish(&self, draft: UnitDraft, fallback_year: Option<&str>) -> Option<AssessmentUnitRecord> {
        let classification_code = match (draft.code, &self.missing_code) {
            (Some(code), _) => code,
            (None, MissingCodePolicy::Label(label)) => label.clone(),
            (None, MissingCodePolicy::Skip) => return None,
        };

        Some(AssessmentUnitRecord {
            classification_code,
            dwelling_count: draft.dwellings,
            land_value: draft.land,
            building_value: draft.building,
            roll_year: draft
                .roll_year
                .or_else(|| fallback_year.map(str::to_string))
                .unwrap_or_default(),
        })
    }
}

/// Parses a non-negative integer; whole decimals such as `"3.0"` are accepted.
pub fn parse_integer(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<u64>() {
        return Some(n);
    }
    parse_decimal(trimmed)
        .filter(|v| *v >= 0.0 && v.fract() == 0.0 && *v <= u64::MAX as f64)
        .map(|v| v as u64)
}

/// Parses a decimal written with either `.` or `,` as the decimal mark.
///
/// Whitespace (including non-breaking spaces) is dropped. When both marks
/// appear, the last one is the decimal mark and the other groups thousands.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) if cleaned.matches(',').count() == 1 => cleaned.replace(',', "."),
        (Some(_), None) => cleaned.replace(',', ""),
        (None, Some(_)) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| if v == 0.0 { 0.0 } else { v })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(code: &str, dwellings: &str, land: &str, building: &str) -> String {
        format!(
            "<RLUEx><RL0105A>{code}</RL0105A><RL0311A>{dwellings}</RL0311A>\
             <RL0402A>{land}</RL0402A><RL0403A>{building}</RL0403A></RLUEx>"
        )
    }

    #[test]
    fn test_extract_units_anywhere_in_tree() {
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <RL><RLM02A>2024</RLM02A><bloc>{}</bloc><autre><profond>{}</profond></autre></RL>",
            unit("1000", "2", "100000", "250000"),
            unit("5812", "0", "80 000,50", "0"),
        );

        let records = RollExtractor::default().extract(xml.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].classification_code, "1000");
        assert_eq!(records[0].dwelling_count, 2);
        assert_eq!(records[0].land_value, 100000.0);
        assert_eq!(records[0].building_value, 250000.0);
        assert_eq!(records[1].classification_code, "5812");
        assert_eq!(records[1].land_value, 80000.5);
    }

    #[test]
    fn test_well_formed_without_units_is_empty() {
        let xml = b"<RL><RLM02A>2024</RLM02A><note>rien</note></RL>";
        let records = RollExtractor::default().extract(xml).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        let extractor = RollExtractor::default();

        for xml in [
            &b"<RL><RLUEx><RL0105A>1000</RL0105A></RL>"[..],
            &b"<RL><RLUEx>"[..],
            &b""[..],
            &b"not xml at all"[..],
            &b"<a/><b/>"[..],
        ] {
            let err = extractor.extract(xml).unwrap_err();
            assert!(
                matches!(err, ExplorerError::MalformedDocument { .. }),
                "expected MalformedDocument for {:?}, got {:?}",
                String::from_utf8_lossy(xml),
                err
            );
        }
    }

    #[test]
    fn test_non_numeric_fields_default_to_zero() {
        let xml = format!("<RL>{}</RL>", unit("1000", "N/A", "N/A", "-12"));
        let records = RollExtractor::default().extract(xml.as_bytes()).unwrap();

        assert_eq!(records[0].dwelling_count, 0);
        assert_eq!(records[0].land_value, 0.0);
        assert_eq!(records[0].building_value, 0.0);
    }

    #[test]
    fn test_missing_fields_default() {
        let xml = b"<RL><RLUEx><RL0105A>1000</RL0105A></RLUEx></RL>";
        let records = RollExtractor::default().extract(xml).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].dwelling_count, 0);
        assert_eq!(records[0].land_value, 0.0);
        assert_eq!(records[0].roll_year, "");
    }

    #[test]
    fn test_roll_year_falls_back_to_root_field() {
        let xml = b"<RL>\
            <RLUEx><RL0105A>1000</RL0105A></RLUEx>\
            <RLUEx><RL0105A>1000</RL0105A><RLM02A>2023</RLM02A></RLUEx>\
            <RLM02A>2024</RLM02A>\
            </RL>";
        let records = RollExtractor::default().extract(xml).unwrap();

        assert_eq!(records[0].roll_year, "2024");
        assert_eq!(records[1].roll_year, "2023");
    }

    #[test]
    fn test_empty_code_uses_missing_code_policy() {
        let xml = b"<RL><RLUEx><RL0105A/><RL0311A>1</RL0311A></RLUEx>\
                    <RLUEx><RL0105A>  </RL0105A></RLUEx></RL>";

        let labelled = RollExtractor::default().extract(xml).unwrap();
        assert_eq!(labelled.len(), 2);
        assert!(labelled.iter().all(|r| r.classification_code == "unknown"));

        let skipping = RollExtractor::new(
            UnitMatcher::default(),
            FieldTable::default(),
            MissingCodePolicy::Skip,
        );
        assert!(skipping.extract(xml).unwrap().is_empty());
    }

    #[test]
    fn test_element_matcher_and_custom_tags() {
        // 舊版檔案：每筆記錄為 <ligne>，欄位標籤不同
        let xml = b"<root><ligne><CUBF>1000</CUBF><LOG>4</LOG></ligne>\
                    <ligne><LOG>1</LOG></ligne><autre><CUBF>9999</CUBF></autre></root>";
        let fields = FieldTable::default()
            .with_tag(UnitField::ClassificationCode, "CUBF")
            .with_tag(UnitField::DwellingCount, "LOG");
        let extractor = RollExtractor::new(
            UnitMatcher::Element("ligne".to_string()),
            fields,
            MissingCodePolicy::default(),
        );

        let records = extractor.extract(xml).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].classification_code, "1000");
        assert_eq!(records[0].dwelling_count, 4);
        assert_eq!(records[1].classification_code, "unknown");
    }

    #[test]
    fn test_namespace_prefix_and_cdata() {
        let xml = b"<r:RL xmlns:r=\"urn:roll\"><r:RLUEx><r:RL0105A><![CDATA[1000]]></r:RL0105A>\
                    <r:RL0402A>1 234,5</r:RL0402A></r:RLUEx></r:RL>";
        let records = RollExtractor::default().extract(xml).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].classification_code, "1000");
        assert_eq!(records[0].land_value, 1234.5);
    }

    #[test]
    fn test_parse_decimal_notations() {
        assert_eq!(parse_decimal("1234,56"), Some(1234.56));
        assert_eq!(parse_decimal("1 234,56"), Some(1234.56));
        assert_eq!(parse_decimal("1\u{a0}234,56"), Some(1234.56));
        assert_eq!(parse_decimal("1.234,56"), Some(1234.56));
        assert_eq!(parse_decimal("1,234.56"), Some(1234.56));
        assert_eq!(parse_decimal("250000"), Some(250000.0));
        assert_eq!(parse_decimal("N/A"), None);
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal(""), None);
    }

    #[test]
    fn test_negative_zero_reads_as_zero() {
        assert!(parse_decimal("-0").unwrap().is_sign_positive());
        assert!(parse_decimal("-0,00").unwrap().is_sign_positive());

        let xml = format!("<RL>{}</RL>", unit("1000", "0", "-0", "-0.0"));
        let records = RollExtractor::default().extract(xml.as_bytes()).unwrap();

        assert!(records[0].land_value.is_sign_positive());
        assert!(records[0].building_value.is_sign_positive());
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("3"), Some(3));
        assert_eq!(parse_integer(" 12 "), Some(12));
        assert_eq!(parse_integer("3.0"), Some(3));
        assert_eq!(parse_integer("2,5"), None);
        assert_eq!(parse_integer("-1"), None);
        assert_eq!(parse_integer("N/A"), None);
    }
}
