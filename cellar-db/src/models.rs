use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Returned when a stored or submitted enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
  pub kind: &'static str,
  pub value: String,
}

/// Wine color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Color {
  #[default]
  Red,
  White,
  #[serde(rename = "Rosé")]
  Rose,
  Sparkling,
  Other,
}

impl Color {
  pub fn as_str(&self) -> &'static str {
    match self {
      Color::Red => "Red",
      Color::White => "White",
      Color::Rose => "Rosé",
      Color::Sparkling => "Sparkling",
      Color::Other => "Other",
    }
  }
}

impl fmt::Display for Color {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Color {
  type Err = UnknownVariant;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "red" => Ok(Color::Red),
      "white" => Ok(Color::White),
      "rosé" | "rose" => Ok(Color::Rose),
      "sparkling" => Ok(Color::Sparkling),
      "other" => Ok(Color::Other),
      _ => Err(UnknownVariant {
        kind: "color",
        value: s.to_string(),
      }),
    }
  }
}

/// Whether a bottle is still in the cellar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Status {
  #[default]
  InCellar,
  Drunk,
}

impl Status {
  pub fn as_str(&self) -> &'static str {
    match self {
      Status::InCellar => "InCellar",
      Status::Drunk => "Drunk",
    }
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Status {
  type Err = UnknownVariant;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "incellar" | "in_cellar" => Ok(Status::InCellar),
      "drunk" => Ok(Status::Drunk),
      _ => Err(UnknownVariant {
        kind: "status",
        value: s.to_string(),
      }),
    }
  }
}

/// A registered account.
#[derive(Debug, Clone)]
pub struct User {
  pub id: i64,
  pub username: String,
  pub email: String,
  /// Argon2 PHC string, never serialized
  pub password_hash: String,
  pub first_name: String,
  pub last_name: String,
  pub date_joined: DateTime<Utc>,
  pub is_active: bool,
}

impl User {
  /// First and last name, whichever is present, falling back to the username.
  pub fn full_name(&self) -> String {
    match (self.first_name.is_empty(), self.last_name.is_empty()) {
      (false, false) => format!("{} {}", self.first_name, self.last_name),
      (false, true) => self.first_name.clone(),
      (true, false) => self.last_name.clone(),
      (true, true) => self.username.clone(),
    }
  }
}

/// Fields needed to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
  pub username: String,
  pub email: String,
  pub password_hash: String,
  pub first_name: String,
  pub last_name: String,
}

/// A wine bottle record owned by a single user.
#[derive(Debug, Clone, PartialEq)]
pub struct Bottle {
  pub id: i64,
  pub owner_id: i64,
  pub name: String,
  pub year: i32,
  pub producer: String,
  pub country: String,
  pub region: Option<String>,
  pub color: Color,
  pub grape: Option<String>,
  pub quantity: u32,
  pub status: Status,
  pub date_added: NaiveDate,
  pub purchase_date: Option<NaiveDate>,
  pub purchase_place: Option<String>,
  pub price: Option<f64>,
  pub estimated_value: Option<f64>,
  pub description: Option<String>,
  pub tasting_note: Option<String>,
  pub rating: Option<u8>,
  /// Path relative to the media root
  pub image: Option<String>,
}

impl Bottle {
  /// Years since the vintage.
  pub fn age(&self, current_year: i32) -> i32 {
    current_year - self.year
  }

  pub fn is_drinkable(&self) -> bool {
    self.status == Status::InCellar && self.quantity > 0
  }

  /// Estimated value of the whole stock, if known.
  pub fn total_value(&self) -> Option<f64> {
    match self.estimated_value {
      Some(value) if self.quantity > 0 => Some(value * self.quantity as f64),
      _ => None,
    }
  }
}

/// Validated fields for a new bottle. Owner and date added are supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBottle {
  pub name: String,
  pub year: i32,
  pub producer: String,
  pub country: String,
  pub region: Option<String>,
  pub color: Color,
  pub grape: Option<String>,
  pub quantity: u32,
  pub status: Status,
  pub purchase_date: Option<NaiveDate>,
  pub purchase_place: Option<String>,
  pub price: Option<f64>,
  pub estimated_value: Option<f64>,
  pub description: Option<String>,
  pub tasting_note: Option<String>,
  pub rating: Option<u8>,
  pub image: Option<String>,
}

/// A set of field changes. `None` leaves a field untouched; for nullable
/// fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BottleChanges {
  pub name: Option<String>,
  pub year: Option<i32>,
  pub producer: Option<String>,
  pub country: Option<String>,
  pub region: Option<Option<String>>,
  pub color: Option<Color>,
  pub grape: Option<Option<String>>,
  pub quantity: Option<u32>,
  pub status: Option<Status>,
  pub purchase_date: Option<Option<NaiveDate>>,
  pub purchase_place: Option<Option<String>>,
  pub price: Option<Option<f64>>,
  pub estimated_value: Option<Option<f64>>,
  pub description: Option<Option<String>>,
  pub tasting_note: Option<Option<String>>,
  pub rating: Option<Option<u8>>,
  pub image: Option<Option<String>>,
}

impl BottleChanges {
  /// Apply every present change to `bottle`.
  pub fn apply(self, bottle: &mut Bottle) {
    fn set<T>(slot: &mut T, change: Option<T>) {
      if let Some(value) = change {
        *slot = value;
      }
    }

    set(&mut bottle.name, self.name);
    set(&mut bottle.year, self.year);
    set(&mut bottle.producer, self.producer);
    set(&mut bottle.country, self.country);
    set(&mut bottle.region, self.region);
    set(&mut bottle.color, self.color);
    set(&mut bottle.grape, self.grape);
    set(&mut bottle.quantity, self.quantity);
    set(&mut bottle.status, self.status);
    set(&mut bottle.purchase_date, self.purchase_date);
    set(&mut bottle.purchase_place, self.purchase_place);
    set(&mut bottle.price, self.price);
    set(&mut bottle.estimated_value, self.estimated_value);
    set(&mut bottle.description, self.description);
    set(&mut bottle.tasting_note, self.tasting_note);
    set(&mut bottle.rating, self.rating);
    set(&mut bottle.image, self.image);
  }
}

/// Search and exact-match filters for listing bottles.
#[derive(Debug, Clone, Default)]
pub struct BottleFilter {
  /// Case-insensitive substring over name, producer, region and grape
  pub search: Option<String>,
  pub color: Option<Color>,
  pub status: Option<Status>,
  pub region: Option<String>,
  pub country: Option<String>,
  pub date_added: Option<NaiveDate>,
}
