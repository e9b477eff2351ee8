use crate::error::AppError;

pub const SKU_WIDTH: usize = 5;
pub const JOB_NUMBER_WIDTH: usize = 6;
pub const BILL_NUMBER_WIDTH: usize = 6;

/// Next code in the `{prefix}-{digits}` family.
///
/// Scans `existing` for codes with exactly this prefix and an all-digit
/// suffix, takes the largest suffix and adds one. Anything else (other
/// prefixes, hand-typed SKUs, suffixes too large to increment) is ignored,
/// so a shop that mixes manual and generated codes keeps counting from its
/// own generated ones.
pub fn next_code<I, S>(prefix: &str, width: usize, existing: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let head = format!("{}-", prefix);
    let next = existing
        .into_iter()
        .filter_map(|code| {
            let suffix = code.as_ref().strip_prefix(&head)?;
            if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            suffix.parse::<u64>().ok()?.checked_add(1)
        })
        .max()
        .unwrap_or(1);

    format!("{}-{:0width$}", prefix, next, width = width)
}

/// Category codes double as SKU prefixes: uppercase ASCII letters and
/// digits, 1 to 10 characters.
pub fn normalize_code(raw: &str) -> Result<String, AppError> {
    let code = raw.trim().to_ascii_uppercase();
    if code.is_empty() || code.len() > 10 || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(AppError::validation(format!(
            "code '{}' must be 1-10 letters or digits",
            raw.trim()
        )));
    }
    Ok(code)
}

/// Manually entered SKUs are trimmed and uppercased.
pub fn normalize_sku(raw: &str) -> Result<String, AppError> {
    let sku = raw.trim().to_ascii_uppercase();
    if sku.is_empty() || sku.len() > 40 || sku.chars().any(char::is_whitespace) {
        return Err(AppError::validation(
            "sku must be 1-40 characters without spaces",
        ));
    }
    Ok(sku)
}
