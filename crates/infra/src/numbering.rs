//! Code generation from number templates.
//!
//! Supported placeholders: `{seq}`, `{seq:N}` (zero-padded to N digits),
//! `{yyyy}` and `{mm}`. Each template string owns its own counter.

use chrono::{DateTime, Datelike, Utc};

use catalog_core::{DomainError, DomainResult};
use catalog_products::MAX_CODE_LENGTH;

use crate::store::{CatalogTx, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Sequence { width: usize },
    Year,
    Month,
}

fn parse(template: &str) -> DomainResult<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut rest = template;
    let mut has_sequence = false;

    while let Some(start) = rest.find('{') {
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        let end = rest[start..]
            .find('}')
            .map(|e| start + e)
            .ok_or_else(|| DomainError::invalid_value("template", "unclosed placeholder"))?;

        let segment = match &rest[start + 1..end] {
            "seq" => Segment::Sequence { width: 0 },
            "yyyy" => Segment::Year,
            "mm" => Segment::Month,
            placeholder => match placeholder.strip_prefix("seq:") {
                Some(width) => Segment::Sequence {
                    width: width
                        .parse()
                        .ok()
                        .filter(|w| (1..=18).contains(w))
                        .ok_or_else(|| DomainError::invalid_value("template", format!("invalid width: {width}")))?,
                },
                None => {
                    return Err(DomainError::invalid_value(
                        "template",
                        format!("unknown placeholder: {{{placeholder}}}"),
                    ));
                }
            },
        };
        has_sequence |= matches!(segment, Segment::Sequence { .. });
        segments.push(segment);
        rest = &rest[end + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }

    if !has_sequence {
        return Err(DomainError::invalid_value("template", "must contain a {seq} placeholder"));
    }
    Ok(segments)
}

/// Render `template` for counter value `seq` at time `at`.
pub fn render(template: &str, seq: i64, at: DateTime<Utc>) -> DomainResult<String> {
    let mut out = String::with_capacity(template.len() + 8);
    for segment in parse(template)? {
        match segment {
            Segment::Literal(s) => out.push_str(s),
            Segment::Sequence { width } => out.push_str(&format!("{seq:0width$}")),
            Segment::Year => out.push_str(&format!("{:04}", at.year())),
            Segment::Month => out.push_str(&format!("{:02}", at.month())),
        }
    }
    Ok(out)
}

/// Digits in the largest counter value.
const MAX_SEQUENCE_DIGITS: usize = 19;

/// Longest code `segments` can render.
fn max_rendered_length(segments: &[Segment<'_>]) -> usize {
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Literal(s) => s.chars().count(),
            Segment::Sequence { width } => (*width).max(MAX_SEQUENCE_DIGITS),
            Segment::Year => 4,
            Segment::Month => 2,
        })
        .sum()
}

/// Templates must parse and must never render a code longer than a product
/// code may be.
pub fn validate_template(template: &str) -> DomainResult<()> {
    let segments = parse(template)?;
    if max_rendered_length(&segments) > MAX_CODE_LENGTH {
        return Err(DomainError::invalid_value(
            "template",
            format!("can render codes longer than {MAX_CODE_LENGTH} characters"),
        ));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum NumberingError {
    #[error(transparent)]
    Template(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Draw the next code for `template`, skipping values already used as a
/// product code.
pub async fn next_code(tx: &mut dyn CatalogTx, template: &str, at: DateTime<Utc>) -> Result<String, NumberingError> {
    validate_template(template)?;
    loop {
        let seq = tx.next_sequence(template).await?;
        let code = render(template, seq, at)?;
        if !tx.code_taken(&code, None).await? {
            return Ok(code);
        }
        tracing::debug!(%code, "generated code already taken; drawing the next one");
    }
}
