//! Field validation for the ad form and the comment form.
//!
//! Validation failures are not application errors: the handlers re-render
//! the form with these messages attached, status 200, nothing persisted.

use crate::uploads;

pub const TITLE_MIN: usize = 2;
pub const TITLE_MAX: usize = 200;
pub const COMMENT_MIN: usize = 3;
pub const COMMENT_MAX: usize = 500;

/// Price field shape: max 7 digits total, 2 decimal places.
const PRICE_MAX_INT_DIGITS: usize = 5;

/// Raw ad form fields as submitted, echoed back on re-render.
#[derive(Debug, Clone, Default)]
pub struct AdFormValues {
    pub title: String,
    pub price: String,
    pub text: String,
    pub tags: String,
}

/// Per-field error messages; `None` means the field passed.
#[derive(Debug, Clone, Default)]
pub struct AdFormErrors {
    pub title: Option<String>,
    pub price: Option<String>,
    pub text: Option<String>,
    pub picture: Option<String>,
}

impl AdFormErrors {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.price.is_none()
            && self.text.is_none()
            && self.picture.is_none()
    }
}

/// Validated, normalized ad fields.
#[derive(Debug, Clone)]
pub struct ValidAd {
    pub title: String,
    pub price: Option<String>,
    pub text: String,
    pub tags: Vec<String>,
}

/// Validate the whole ad form. `picture_len` is the byte length of an
/// uploaded picture, if one was submitted.
pub fn validate_ad(
    values: &AdFormValues,
    picture_len: Option<u64>,
    max_upload_bytes: u64,
) -> Result<ValidAd, AdFormErrors> {
    let mut errors = AdFormErrors::default();

    let title = values.title.trim().to_string();
    let title_len = title.chars().count();
    if title_len < TITLE_MIN {
        errors.title = Some(format!("Title must be at least {} characters", TITLE_MIN));
    } else if title_len > TITLE_MAX {
        errors.title = Some(format!("Title must be at most {} characters", TITLE_MAX));
    }

    let price = match validate_price(&values.price) {
        Ok(p) => p,
        Err(msg) => {
            errors.price = Some(msg);
            None
        }
    };

    let text = values.text.trim().to_string();
    if text.is_empty() {
        errors.text = Some("Text is required".to_string());
    }

    if let Some(len) = picture_len {
        if let Err(msg) = uploads::check_size(len, max_upload_bytes) {
            errors.picture = Some(msg);
        }
    }

    if errors.is_empty() {
        Ok(ValidAd {
            title,
            price,
            text,
            tags: parse_tags(&values.tags),
        })
    } else {
        Err(errors)
    }
}

/// Normalize a price to a canonical two-decimal string. Empty input is
/// no price. Max 5 digits before the point, 2 after (7 total).
pub fn validate_price(input: &str) -> Result<Option<String>, String> {
    let s = input.trim();
    if s.is_empty() {
        return Ok(None);
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };

    if int_part.is_empty()
        || !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
        || frac_part.len() > 2
    {
        return Err("Enter a valid price".to_string());
    }

    let int_normalized = int_part.trim_start_matches('0');
    let int_normalized = if int_normalized.is_empty() {
        "0"
    } else {
        int_normalized
    };
    if int_normalized.len() > PRICE_MAX_INT_DIGITS {
        return Err("Price has too many digits".to_string());
    }

    Ok(Some(format!("{}.{:0<2}", int_normalized, frac_part)))
}

/// Split a comma-separated tag list into a normalized set: trimmed,
/// lowercased, empties dropped, duplicates removed, input order kept.
pub fn parse_tags(input: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for raw in input.split(',') {
        let tag = raw.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Validate a comment body: 3..=500 chars after trimming.
pub fn validate_comment(input: &str) -> Result<String, String> {
    let text = input.trim().to_string();
    let len = text.chars().count();
    if len < COMMENT_MIN {
        Err(format!(
            "Comment must be at least {} characters",
            COMMENT_MIN
        ))
    } else if len > COMMENT_MAX {
        Err(format!("Comment must be at most {} characters", COMMENT_MAX))
    } else {
        Ok(text)
    }
}
