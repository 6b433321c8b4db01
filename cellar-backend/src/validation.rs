/// Input validation functions for bottle and account payloads
use std::collections::BTreeMap;
use thiserror::Error;

pub const MIN_YEAR: i32 = 1800;
pub const MAX_QUANTITY: i64 = 1000;
pub const MAX_PRICE: f64 = 50_000.0;
pub const MAX_ESTIMATED_VALUE: f64 = 99_999.99;
pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

pub const NAME_MAX_LEN: usize = 200;
pub const PRODUCER_MAX_LEN: usize = 100;
pub const COUNTRY_MAX_LEN: usize = 50;
pub const REGION_MAX_LEN: usize = 100;
pub const GRAPE_MAX_LEN: usize = 100;
pub const PURCHASE_PLACE_MAX_LEN: usize = 150;
pub const USERNAME_MAX_LEN: usize = 150;
pub const PERSON_NAME_MAX_LEN: usize = 150;
pub const EMAIL_MAX_LEN: usize = 254;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ValidationError {
    #[error("This field is required.")]
    Required,

    #[error("This field may not be blank.")]
    Blank,

    #[error("This field may not be null.")]
    Null,

    #[error("Ensure this field has no more than {max} characters (it has {actual}).")]
    TooLong { max: usize, actual: usize },

    #[error("A valid integer is required.")]
    NotAnInteger,

    #[error("A valid number is required.")]
    NotANumber,

    #[error("Not a valid string.")]
    NotAString,

    #[error("Date has wrong format. Use YYYY-MM-DD.")]
    InvalidDate,

    #[error("\"{0}\" is not a valid choice.")]
    InvalidChoice(String),

    #[error("The year cannot be earlier than 1800.")]
    YearTooEarly,

    #[error("The year cannot be later than {max}.")]
    YearTooLate { max: i32 },

    #[error("Quantity cannot be negative.")]
    QuantityNegative,

    #[error("Quantity too high (maximum 1000 bottles).")]
    QuantityTooHigh,

    #[error("Price cannot be negative.")]
    PriceNegative,

    #[error("Price too high (maximum {max}).")]
    PriceTooHigh { max: f64 },

    #[error("Ensure that there are no more than 2 decimal places.")]
    TooManyDecimalPlaces,

    #[error("Rating cannot be lower than 1.")]
    RatingTooLow,

    #[error("Rating cannot be higher than 5.")]
    RatingTooHigh,

    #[error("The file is too large. Maximum size: {max_mb}MB.")]
    ImageTooLarge { max_mb: usize },

    #[error("File extension not allowed. Allowed extensions: .jpg, .jpeg, .png, .gif, .webp.")]
    ImageExtension,

    #[error("File type not allowed: {0}.")]
    ImageFormat(String),

    #[error("The image file is corrupt or invalid.")]
    ImageCorrupt,

    #[error("Image too large. Maximum dimensions: {max}x{max}px.")]
    ImageDimensions { max: u32 },

    #[error("The image could not be processed.")]
    ImageProcessing,

    #[error("The submitted data was not a file. Check the encoding type on the form.")]
    NotAFile,

    #[error("Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters.")]
    UsernameInvalid,

    #[error("A user with that username already exists.")]
    UsernameTaken,

    #[error("Enter a valid email address.")]
    EmailInvalid,

    #[error("Passwords do not match.")]
    PasswordMismatch,

    #[error("This password is too short. It must contain at least {min} characters.")]
    PasswordTooShort { min: usize },

    #[error("This password is too common.")]
    PasswordTooCommon,

    #[error("This password is entirely numeric.")]
    PasswordEntirelyNumeric,

    #[error("The password is too similar to the {0}.")]
    PasswordTooSimilar(&'static str),
}

/// Errors keyed by field name, in the order fields were checked
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FieldErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single error on a single field
    pub fn single(field: &str, error: ValidationError) -> Self {
        let mut errors = Self::new();
        errors.add(field, error);
        errors
    }

    pub fn add(&mut self, field: &str, error: ValidationError) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(error.to_string());
    }

    /// Record the error of `result`, if any, and return its value
    pub fn check<T>(&mut self, field: &str, result: Result<T, ValidationError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.add(field, err);
                None
            }
        }
    }

    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn into_map(self) -> BTreeMap<String, Vec<String>> {
        self.errors
    }

    /// `Ok(value)` if nothing was recorded
    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

/// Validates a vintage year
///
/// Rules:
/// - Not before 1800
/// - Not after next year
pub fn validate_year(year: i64, current_year: i32) -> Result<i32, ValidationError> {
    if year < MIN_YEAR as i64 {
        return Err(ValidationError::YearTooEarly);
    }
    let max = current_year + 1;
    if year > max as i64 {
        return Err(ValidationError::YearTooLate { max });
    }
    Ok(year as i32)
}

/// Validates a bottle count (0..=1000)
pub fn validate_quantity(quantity: i64) -> Result<u32, ValidationError> {
    if quantity < 0 {
        return Err(ValidationError::QuantityNegative);
    }
    if quantity > MAX_QUANTITY {
        return Err(ValidationError::QuantityTooHigh);
    }
    Ok(quantity as u32)
}

/// Validates a purchase price (0..=50000, cents precision)
pub fn validate_price(price: f64) -> Result<f64, ValidationError> {
    validate_amount(price, MAX_PRICE)
}

/// Validates an estimated value (0..=99999.99, cents precision)
pub fn validate_estimated_value(value: f64) -> Result<f64, ValidationError> {
    validate_amount(value, MAX_ESTIMATED_VALUE)
}

fn validate_amount(amount: f64, max: f64) -> Result<f64, ValidationError> {
    if !amount.is_finite() {
        return Err(ValidationError::NotANumber);
    }
    if amount < 0.0 {
        return Err(ValidationError::PriceNegative);
    }
    if amount > max {
        return Err(ValidationError::PriceTooHigh { max });
    }
    let cents = amount * 100.0;
    if (cents - cents.round()).abs() > 1e-6 {
        return Err(ValidationError::TooManyDecimalPlaces);
    }
    Ok(amount)
}

/// Validates a rating on a 1..=5 scale
pub fn validate_rating(rating: i64) -> Result<u8, ValidationError> {
    if rating < MIN_RATING {
        return Err(ValidationError::RatingTooLow);
    }
    if rating > MAX_RATING {
        return Err(ValidationError::RatingTooHigh);
    }
    Ok(rating as u8)
}

/// Validates a required text field: trimmed, non-blank, at most `max` characters
pub fn validate_required_text(value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Blank);
    }
    validate_length(trimmed, max)
}

/// Validates an optional text field. Blank values become `None`
pub fn validate_optional_text(
    value: Option<&str>,
    max: Option<usize>,
) -> Result<Option<String>, ValidationError> {
    let Some(trimmed) = value.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match max {
        Some(max) => validate_length(trimmed, max).map(Some),
        None => Ok(Some(trimmed.to_string())),
    }
}

fn validate_length(value: &str, max: usize) -> Result<String, ValidationError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong { max, actual });
    }
    Ok(value.to_string())
}

/// Validates a username
///
/// Rules:
/// - Cannot be empty
/// - Max 150 characters
/// - Letters, digits and @ . + - _ only
pub fn validate_username(username: &str) -> Result<String, ValidationError> {
    let username = validate_required_text(username, USERNAME_MAX_LEN)?;
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(ValidationError::UsernameInvalid);
    }
    Ok(username)
}

/// Validates an optional email address. Empty is allowed
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Ok(String::new());
    }
    validate_length(email, EMAIL_MAX_LEN)?;

    let Some((local, domain)) = email.rsplit_once('@') else {
        return Err(ValidationError::EmailInvalid);
    };
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..");
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::EmailInvalid);
    }
    Ok(email.to_string())
}
