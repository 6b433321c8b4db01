mod error;
mod models;

pub use error::{DbError, Result};
pub use models::{
  Bottle, BottleChanges, BottleFilter, Color, NewBottle, NewUser, Status, UnknownVariant, User,
};

use chrono::{NaiveDate, Utc};
use std::path::Path;
use std::str::FromStr;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::types::{ToSql, Type};
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, info};

const BOTTLE_COLUMNS: &str = "id, owner_id, name, year, producer, country, region, color, grape, \
   quantity, status, date_added, purchase_date, purchase_place, price, estimated_value, \
   description, tasting_note, rating, image";

const USER_COLUMNS: &str =
  "id, username, email, password_hash, first_name, last_name, date_joined, is_active";

/// Database wrapper for all cellar operations.
#[derive(Clone)]
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create a database at the given path.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path).await.map_err(DbError::Sqlite)?;
    let db = Self { conn };
    db.initialize().await?;
    Ok(db)
  }

  /// Create an in-memory database (useful for testing).
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .await
      .map_err(DbError::Sqlite)?;
    let db = Self { conn };
    db.initialize().await?;
    Ok(db)
  }

  /// Initialize the database schema.
  async fn initialize(&self) -> Result<()> {
    self.conn
            .call(|conn| {
                conn.pragma_update(None, "journal_mode", "WAL")?;

                // Needed for ON DELETE CASCADE (must be set per-connection)
                conn.pragma_update(None, "foreign_keys", "ON")?;

                conn.execute_batch(
                    r#"
                    CREATE TABLE IF NOT EXISTS users (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        username TEXT NOT NULL UNIQUE,
                        email TEXT NOT NULL DEFAULT '',
                        password_hash TEXT NOT NULL,
                        first_name TEXT NOT NULL DEFAULT '',
                        last_name TEXT NOT NULL DEFAULT '',
                        date_joined TEXT NOT NULL,
                        is_active INTEGER NOT NULL DEFAULT 1
                    );

                    CREATE TABLE IF NOT EXISTS bottles (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                        name TEXT NOT NULL,
                        year INTEGER NOT NULL,
                        producer TEXT NOT NULL,
                        country TEXT NOT NULL,
                        region TEXT,
                        color TEXT NOT NULL,
                        grape TEXT,
                        quantity INTEGER NOT NULL DEFAULT 1,
                        status TEXT NOT NULL,
                        date_added TEXT NOT NULL,
                        purchase_date TEXT,
                        purchase_place TEXT,
                        price REAL,
                        estimated_value REAL,
                        description TEXT,
                        tasting_note TEXT,
                        rating INTEGER,
                        image TEXT
                    );

                    CREATE INDEX IF NOT EXISTS idx_bottles_owner ON bottles(owner_id);
                    "#,
                )?;
                Ok(())
            })
            .await?;

    info!("database initialized");
    Ok(())
  }

  // ========================================================================
  // Users
  // ========================================================================

  /// Create a new user. Fails with `UsernameTaken` if the username exists.
  pub async fn create_user(&self, new_user: NewUser) -> Result<User> {
    let now = Utc::now();

    let user = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists: bool = tx
          .prepare_cached("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)")?
          .query_row(params![&new_user.username], |row| row.get(0))?;

        if exists {
          return Ok(Err(DbError::UsernameTaken));
        }

        tx.prepare_cached(
          "INSERT INTO users (username, email, password_hash, first_name, last_name, date_joined, is_active) \
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
        )?
        .execute(params![
          &new_user.username,
          &new_user.email,
          &new_user.password_hash,
          &new_user.first_name,
          &new_user.last_name,
          now.to_rfc3339(),
        ])?;
        let id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(Ok(User {
          id,
          username: new_user.username,
          email: new_user.email,
          password_hash: new_user.password_hash,
          first_name: new_user.first_name,
          last_name: new_user.last_name,
          date_joined: now,
          is_active: true,
        }))
      })
      .await??;

    debug!(user.id, %user.username, "created user");
    Ok(user)
  }

  /// Get a user by id.
  pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
    let user = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?
          .query_row(params![id], user_from_row)
          .optional()
      })
      .await?;

    Ok(user)
  }

  /// Get a user by username (exact match).
  pub async fn get_user_by_username(&self, username: String) -> Result<Option<User>> {
    let user = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?1"
          ))?
          .query_row(params![&username], user_from_row)
          .optional()
      })
      .await?;

    Ok(user)
  }

  /// Check if a username is already registered.
  pub async fn username_exists(&self, username: String) -> Result<bool> {
    let exists = self
      .conn
      .call(move |conn| {
        let exists: bool = conn
          .prepare_cached("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)")?
          .query_row(params![&username], |row| row.get(0))?;

        Ok(exists)
      })
      .await?;

    Ok(exists)
  }

  /// Number of user accounts.
  pub async fn count_users(&self) -> Result<u64> {
    let count = self
      .conn
      .call(|conn| {
        let count: i64 = conn
          .prepare_cached("SELECT COUNT(*) FROM users")?
          .query_row([], |row| row.get(0))?;
        Ok(count as u64)
      })
      .await?;

    Ok(count)
  }

  /// Delete a user and, through the foreign key, all of their bottles.
  pub async fn delete_user(&self, id: i64) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let deleted = conn
          .prepare_cached("DELETE FROM users WHERE id = ?1")?
          .execute(params![id])?;

        if deleted == 0 {
          return Ok(Err(DbError::UserNotFound));
        }

        Ok(Ok(()))
      })
      .await??;

    debug!(id, "deleted user");
    Ok(())
  }

  // ========================================================================
  // Bottles
  // ========================================================================

  /// Insert a bottle owned by `owner_id`, stamped with `date_added`.
  pub async fn create_bottle(
    &self,
    owner_id: i64,
    bottle: NewBottle,
    date_added: NaiveDate,
  ) -> Result<Bottle> {
    let bottle = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(
            "INSERT INTO bottles (owner_id, name, year, producer, country, region, color, grape, \
             quantity, status, date_added, purchase_date, purchase_place, price, estimated_value, \
             description, tasting_note, rating, image) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
          )?
          .execute(params![
            owner_id,
            &bottle.name,
            bottle.year,
            &bottle.producer,
            &bottle.country,
            &bottle.region,
            bottle.color.as_str(),
            &bottle.grape,
            bottle.quantity,
            bottle.status.as_str(),
            date_added.to_string(),
            bottle.purchase_date.map(|d| d.to_string()),
            &bottle.purchase_place,
            bottle.price,
            bottle.estimated_value,
            &bottle.description,
            &bottle.tasting_note,
            bottle.rating,
            &bottle.image,
          ])?;

        Ok(Bottle {
          id: conn.last_insert_rowid(),
          owner_id,
          name: bottle.name,
          year: bottle.year,
          producer: bottle.producer,
          country: bottle.country,
          region: bottle.region,
          color: bottle.color,
          grape: bottle.grape,
          quantity: bottle.quantity,
          status: bottle.status,
          date_added,
          purchase_date: bottle.purchase_date,
          purchase_place: bottle.purchase_place,
          price: bottle.price,
          estimated_value: bottle.estimated_value,
          description: bottle.description,
          tasting_note: bottle.tasting_note,
          rating: bottle.rating,
          image: bottle.image,
        })
      })
      .await?;

    debug!(bottle.id, bottle.owner_id, %bottle.name, "created bottle");
    Ok(bottle)
  }

  /// Get a bottle owned by `owner_id`. Bottles of other owners are reported
  /// as not found.
  pub async fn get_bottle(&self, owner_id: i64, id: i64) -> Result<Bottle> {
    let bottle = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(&format!(
            "SELECT {BOTTLE_COLUMNS} FROM bottles WHERE id = ?1 AND owner_id = ?2"
          ))?
          .query_row(params![id, owner_id], bottle_from_row)
          .optional()
      })
      .await?;

    bottle.ok_or(DbError::BottleNotFound)
  }

  /// List the bottles of `owner_id` matching `filter`, newest first.
  pub async fn list_bottles(&self, owner_id: i64, filter: BottleFilter) -> Result<Vec<Bottle>> {
    let bottles = self
      .conn
      .call(move |conn| {
        let mut clauses = vec!["owner_id = ?".to_string()];
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(owner_id)];

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
          let pattern = format!("%{}%", escape_like(search));
          clauses.push(
            "(name LIKE ? ESCAPE '\\' OR producer LIKE ? ESCAPE '\\' \
             OR region LIKE ? ESCAPE '\\' OR grape LIKE ? ESCAPE '\\')"
              .to_string(),
          );
          for _ in 0..4 {
            args.push(Box::new(pattern.clone()));
          }
        }
        if let Some(color) = filter.color {
          clauses.push("color = ?".to_string());
          args.push(Box::new(color.as_str()));
        }
        if let Some(status) = filter.status {
          clauses.push("status = ?".to_string());
          args.push(Box::new(status.as_str()));
        }
        if let Some(region) = filter.region {
          clauses.push("region = ?".to_string());
          args.push(Box::new(region));
        }
        if let Some(country) = filter.country {
          clauses.push("country = ?".to_string());
          args.push(Box::new(country));
        }
        if let Some(date_added) = filter.date_added {
          clauses.push("date_added = ?".to_string());
          args.push(Box::new(date_added.to_string()));
        }

        let sql = format!(
          "SELECT {BOTTLE_COLUMNS} FROM bottles WHERE {} ORDER BY date_added DESC, name ASC, id ASC",
          clauses.join(" AND ")
        );

        let mut stmt = conn.prepare(&sql)?;
        let bottles = stmt
          .query_map(params_from_iter(args.iter()), bottle_from_row)?
          .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(bottles)
      })
      .await?;

    debug!(owner_id, count = bottles.len(), "listed bottles");
    Ok(bottles)
  }

  /// Apply `changes` to a bottle owned by `owner_id`. Returns the updated
  /// bottle and the image path it held before, read in the same transaction.
  pub async fn update_bottle(
    &self,
    owner_id: i64,
    id: i64,
    changes: BottleChanges,
  ) -> Result<(Bottle, Option<String>)> {
    let (bottle, previous_image) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let existing = tx
          .prepare_cached(&format!(
            "SELECT {BOTTLE_COLUMNS} FROM bottles WHERE id = ?1 AND owner_id = ?2"
          ))?
          .query_row(params![id, owner_id], bottle_from_row)
          .optional()?;

        let mut bottle = match existing {
          Some(b) => b,
          None => return Ok(Err(DbError::BottleNotFound)),
        };
        let previous_image = bottle.image.clone();
        changes.apply(&mut bottle);

        tx.prepare_cached(
          "UPDATE bottles SET name = ?1, year = ?2, producer = ?3, country = ?4, region = ?5, \
           color = ?6, grape = ?7, quantity = ?8, status = ?9, purchase_date = ?10, \
           purchase_place = ?11, price = ?12, estimated_value = ?13, description = ?14, \
           tasting_note = ?15, rating = ?16, image = ?17 \
           WHERE id = ?18 AND owner_id = ?19",
        )?
        .execute(params![
          &bottle.name,
          bottle.year,
          &bottle.producer,
          &bottle.country,
          &bottle.region,
          bottle.color.as_str(),
          &bottle.grape,
          bottle.quantity,
          bottle.status.as_str(),
          bottle.purchase_date.map(|d| d.to_string()),
          &bottle.purchase_place,
          bottle.price,
          bottle.estimated_value,
          &bottle.description,
          &bottle.tasting_note,
          bottle.rating,
          &bottle.image,
          id,
          owner_id,
        ])?;

        tx.commit()?;
        Ok(Ok((bottle, previous_image)))
      })
      .await??;

    debug!(bottle.id, owner_id, "updated bottle");
    Ok((bottle, previous_image))
  }

  /// Delete a bottle owned by `owner_id`, returning the removed row.
  pub async fn delete_bottle(&self, owner_id: i64, id: i64) -> Result<Bottle> {
    let bottle = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let existing = tx
          .prepare_cached(&format!(
            "SELECT {BOTTLE_COLUMNS} FROM bottles WHERE id = ?1 AND owner_id = ?2"
          ))?
          .query_row(params![id, owner_id], bottle_from_row)
          .optional()?;

        let bottle = match existing {
          Some(b) => b,
          None => return Ok(Err(DbError::BottleNotFound)),
        };

        tx.prepare_cached("DELETE FROM bottles WHERE id = ?1 AND owner_id = ?2")?
          .execute(params![id, owner_id])?;

        tx.commit()?;
        Ok(Ok(bottle))
      })
      .await??;

    debug!(bottle.id, owner_id, "deleted bottle");
    Ok(bottle)
  }

  /// Number of bottle records owned by a user.
  pub async fn count_bottles(&self, owner_id: i64) -> Result<u64> {
    let count = self
      .conn
      .call(move |conn| {
        let count: i64 = conn
          .prepare_cached("SELECT COUNT(*) FROM bottles WHERE owner_id = ?1")?
          .query_row(params![owner_id], |row| row.get(0))?;
        Ok(count as u64)
      })
      .await?;

    Ok(count)
  }
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
  Ok(User {
    id: row.get(0)?,
    username: row.get(1)?,
    email: row.get(2)?,
    password_hash: row.get(3)?,
    first_name: row.get(4)?,
    last_name: row.get(5)?,
    date_joined: parse_column(row, 6)?,
    is_active: row.get(7)?,
  })
}

fn bottle_from_row(row: &Row) -> rusqlite::Result<Bottle> {
  Ok(Bottle {
    id: row.get(0)?,
    owner_id: row.get(1)?,
    name: row.get(2)?,
    year: row.get(3)?,
    producer: row.get(4)?,
    country: row.get(5)?,
    region: row.get(6)?,
    color: parse_column(row, 7)?,
    grape: row.get(8)?,
    quantity: row.get(9)?,
    status: parse_column(row, 10)?,
    date_added: parse_column(row, 11)?,
    purchase_date: parse_optional_column(row, 12)?,
    purchase_place: row.get(13)?,
    price: row.get(14)?,
    estimated_value: row.get(15)?,
    description: row.get(16)?,
    tasting_note: row.get(17)?,
    rating: row.get(18)?,
    image: row.get(19)?,
  })
}

/// Read a TEXT column and parse it with `FromStr`.
fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
  T: FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  let raw: String = row.get(idx)?;
  raw
    .parse()
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_column<T>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>>
where
  T: FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  let raw: Option<String> = row.get(idx)?;
  raw
    .map(|s| s.parse())
    .transpose()
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Escape LIKE wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
  let mut escaped = String::with_capacity(input.len());
  for c in input.chars() {
    if matches!(c, '%' | '_' | '\\') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped
}

#[cfg(test)]
mod tests {
  use super::*;

  fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
  }

  fn new_user(username: &str) -> NewUser {
    NewUser {
      username: username.to_string(),
      email: format!("{username}@example.com"),
      password_hash: "$argon2id$fake".to_string(),
      first_name: String::new(),
      last_name: String::new(),
    }
  }

  fn new_bottle(name: &str) -> NewBottle {
    NewBottle {
      name: name.to_string(),
      year: 2018,
      producer: "Château Margaux".to_string(),
      country: "France".to_string(),
      region: Some("Margaux, Bordeaux".to_string()),
      color: Color::Red,
      grape: Some("Cabernet Sauvignon, Merlot".to_string()),
      quantity: 3,
      status: Status::InCellar,
      purchase_date: None,
      purchase_place: None,
      price: Some(450.0),
      estimated_value: Some(480.0),
      description: None,
      tasting_note: None,
      rating: Some(5),
      image: None,
    }
  }

  #[tokio::test]
  async fn test_user_lifecycle() {
    let db = Database::open_in_memory().await.unwrap();

    let user = db.create_user(new_user("alice")).await.unwrap();
    assert_eq!(user.username, "alice");
    assert!(user.is_active);

    let fetched = db.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(fetched.username, "alice");
    assert_eq!(fetched.email, "alice@example.com");

    let by_name = db
      .get_user_by_username("alice".to_string())
      .await
      .unwrap()
      .unwrap();
    assert_eq!(by_name.id, user.id);

    assert!(db.username_exists("alice".to_string()).await.unwrap());
    assert!(!db.username_exists("bob".to_string()).await.unwrap());
    assert_eq!(db.count_users().await.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_duplicate_username() {
    let db = Database::open_in_memory().await.unwrap();

    db.create_user(new_user("alice")).await.unwrap();
    let result = db.create_user(new_user("alice")).await;
    assert!(matches!(result, Err(DbError::UsernameTaken)));
    assert_eq!(db.count_users().await.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_bottle_lifecycle() {
    let db = Database::open_in_memory().await.unwrap();
    let user = db.create_user(new_user("alice")).await.unwrap();

    let bottle = db
      .create_bottle(user.id, new_bottle("Château Margaux"), today())
      .await
      .unwrap();
    assert_eq!(bottle.owner_id, user.id);
    assert_eq!(bottle.date_added, today());

    let fetched = db.get_bottle(user.id, bottle.id).await.unwrap();
    assert_eq!(fetched, bottle);

    let (updated, previous_image) = db
      .update_bottle(
        user.id,
        bottle.id,
        BottleChanges {
          quantity: Some(0),
          status: Some(Status::Drunk),
          region: Some(None),
          ..Default::default()
        },
      )
      .await
      .unwrap();
    assert_eq!(previous_image, None);
    assert_eq!(updated.quantity, 0);
    assert_eq!(updated.status, Status::Drunk);
    assert_eq!(updated.region, None);
    assert_eq!(updated.name, "Château Margaux");
    assert_eq!(updated.date_added, today());
    assert_eq!(db.get_bottle(user.id, bottle.id).await.unwrap(), updated);

    let deleted = db.delete_bottle(user.id, bottle.id).await.unwrap();
    assert_eq!(deleted.id, bottle.id);
    assert!(matches!(
      db.get_bottle(user.id, bottle.id).await,
      Err(DbError::BottleNotFound)
    ));
  }

  #[tokio::test]
  async fn test_update_reports_the_replaced_image() {
    let db = Database::open_in_memory().await.unwrap();
    let user = db.create_user(new_user("alice")).await.unwrap();
    let mut photographed = new_bottle("With Photo");
    photographed.image = Some("bottles/first.jpg".to_string());
    let bottle = db.create_bottle(user.id, photographed, today()).await.unwrap();

    let replace = |path: &str| BottleChanges {
      image: Some(Some(path.to_string())),
      ..Default::default()
    };

    let (a, b) = tokio::join!(
      db.update_bottle(user.id, bottle.id, replace("bottles/second.jpg")),
      db.update_bottle(user.id, bottle.id, replace("bottles/third.jpg")),
    );
    let (_, replaced_a) = a.unwrap();
    let (_, replaced_b) = b.unwrap();
    let current = db.get_bottle(user.id, bottle.id).await.unwrap().image;

    // Every path written is either current or reported as replaced exactly once
    let mut seen: Vec<String> = [replaced_a, replaced_b, current]
      .into_iter()
      .flatten()
      .collect();
    seen.sort();
    assert_eq!(
      seen,
      ["bottles/first.jpg", "bottles/second.jpg", "bottles/third.jpg"]
    );
  }

  #[tokio::test]
  async fn test_bottles_are_owner_scoped() {
    let db = Database::open_in_memory().await.unwrap();
    let alice = db.create_user(new_user("alice")).await.unwrap();
    let bob = db.create_user(new_user("bob")).await.unwrap();

    let bottle = db
      .create_bottle(alice.id, new_bottle("Alice Wine"), today())
      .await
      .unwrap();

    assert!(matches!(
      db.get_bottle(bob.id, bottle.id).await,
      Err(DbError::BottleNotFound)
    ));
    assert!(matches!(
      db.update_bottle(bob.id, bottle.id, BottleChanges::default()).await,
      Err(DbError::BottleNotFound)
    ));
    assert!(matches!(
      db.delete_bottle(bob.id, bottle.id).await,
      Err(DbError::BottleNotFound)
    ));
    assert!(db
      .list_bottles(bob.id, BottleFilter::default())
      .await
      .unwrap()
      .is_empty());

    // Still there for the owner
    assert_eq!(db.count_bottles(alice.id).await.unwrap(), 1);
    assert_eq!(db.count_bottles(bob.id).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_list_ordering() {
    let db = Database::open_in_memory().await.unwrap();
    let user = db.create_user(new_user("alice")).await.unwrap();

    let older = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    db.create_bottle(user.id, new_bottle("Old"), older).await.unwrap();
    db.create_bottle(user.id, new_bottle("Zinfandel"), today()).await.unwrap();
    db.create_bottle(user.id, new_bottle("Barolo"), today()).await.unwrap();

    let names: Vec<String> = db
      .list_bottles(user.id, BottleFilter::default())
      .await
      .unwrap()
      .into_iter()
      .map(|b| b.name)
      .collect();
    assert_eq!(names, vec!["Barolo", "Zinfandel", "Old"]);
  }

  #[tokio::test]
  async fn test_list_search_and_filters() {
    let db = Database::open_in_memory().await.unwrap();
    let user = db.create_user(new_user("alice")).await.unwrap();

    db.create_bottle(user.id, new_bottle("Château Margaux"), today())
      .await
      .unwrap();

    let mut champagne = new_bottle("Dom Pérignon");
    champagne.producer = "Moët & Chandon".to_string();
    champagne.region = Some("Champagne".to_string());
    champagne.grape = Some("Chardonnay, Pinot Noir".to_string());
    champagne.color = Color::Sparkling;
    db.create_bottle(user.id, champagne, today()).await.unwrap();

    let mut riesling = new_bottle("Riesling Grand Cru");
    riesling.producer = "Trimbach".to_string();
    riesling.region = None;
    riesling.grape = Some("Riesling".to_string());
    riesling.color = Color::White;
    riesling.status = Status::Drunk;
    riesling.country = "Germany".to_string();
    db.create_bottle(user.id, riesling, today()).await.unwrap();

    let search = |s: &str| BottleFilter {
      search: Some(s.to_string()),
      ..Default::default()
    };

    // Case-insensitive substring over grape
    let found = db.list_bottles(user.id, search("pinot")).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Dom Pérignon");

    // Over producer
    let found = db.list_bottles(user.id, search("trimb")).await.unwrap();
    assert_eq!(found.len(), 1);

    // Over region
    let found = db.list_bottles(user.id, search("bordeaux")).await.unwrap();
    assert_eq!(found.len(), 1);

    // Wildcards match literally
    let found = db.list_bottles(user.id, search("%")).await.unwrap();
    assert!(found.is_empty());

    let by_color = db
      .list_bottles(
        user.id,
        BottleFilter {
          color: Some(Color::Sparkling),
          ..Default::default()
        },
      )
      .await
      .unwrap();
    assert_eq!(by_color.len(), 1);

    let by_status = db
      .list_bottles(
        user.id,
        BottleFilter {
          status: Some(Status::Drunk),
          ..Default::default()
        },
      )
      .await
      .unwrap();
    assert_eq!(by_status[0].name, "Riesling Grand Cru");

    let by_country = db
      .list_bottles(
        user.id,
        BottleFilter {
          country: Some("France".to_string()),
          region: Some("Champagne".to_string()),
          ..Default::default()
        },
      )
      .await
      .unwrap();
    assert_eq!(by_country.len(), 1);

    let by_date = db
      .list_bottles(
        user.id,
        BottleFilter {
          date_added: Some(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
          ..Default::default()
        },
      )
      .await
      .unwrap();
    assert!(by_date.is_empty());
  }

  #[tokio::test]
  async fn test_delete_user_cascades_to_bottles() {
    let db = Database::open_in_memory().await.unwrap();
    let user = db.create_user(new_user("alice")).await.unwrap();
    let bottle = db
      .create_bottle(user.id, new_bottle("Cascade"), today())
      .await
      .unwrap();

    db.delete_user(user.id).await.unwrap();

    assert!(db.get_user(user.id).await.unwrap().is_none());
    assert!(matches!(
      db.get_bottle(user.id, bottle.id).await,
      Err(DbError::BottleNotFound)
    ));
    assert_eq!(db.count_bottles(user.id).await.unwrap(), 0);
    assert!(matches!(
      db.delete_user(user.id).await,
      Err(DbError::UserNotFound)
    ));
  }

  #[test]
  fn test_derived_values() {
    let bottle = Bottle {
      id: 1,
      owner_id: 1,
      name: "Test".to_string(),
      year: 2018,
      producer: "P".to_string(),
      country: "France".to_string(),
      region: None,
      color: Color::Red,
      grape: None,
      quantity: 3,
      status: Status::InCellar,
      date_added: today(),
      purchase_date: None,
      purchase_place: None,
      price: None,
      estimated_value: Some(20.0),
      description: None,
      tasting_note: None,
      rating: None,
      image: None,
    };
    assert_eq!(bottle.age(2024), 6);
    assert!(bottle.is_drinkable());
    assert_eq!(bottle.total_value(), Some(60.0));

    let drunk = Bottle {
      status: Status::Drunk,
      quantity: 0,
      ..bottle
    };
    assert!(!drunk.is_drinkable());
    assert_eq!(drunk.total_value(), None);
  }

  #[test]
  fn test_enum_parsing() {
    assert_eq!("Rosé".parse::<Color>().unwrap(), Color::Rose);
    assert_eq!("rose".parse::<Color>().unwrap(), Color::Rose);
    assert_eq!("SPARKLING".parse::<Color>().unwrap(), Color::Sparkling);
    assert!("Blue".parse::<Color>().is_err());
    assert_eq!("InCellar".parse::<Status>().unwrap(), Status::InCellar);
    assert_eq!("drunk".parse::<Status>().unwrap(), Status::Drunk);
    assert!("Lost".parse::<Status>().is_err());
  }

  #[test]
  fn test_full_name() {
    let mut user = User {
      id: 1,
      username: "jdoe".to_string(),
      email: String::new(),
      password_hash: String::new(),
      first_name: String::new(),
      last_name: String::new(),
      date_joined: Utc::now(),
      is_active: true,
    };
    assert_eq!(user.full_name(), "jdoe");
    user.last_name = "Doe".to_string();
    assert_eq!(user.full_name(), "Doe");
    user.first_name = "Jane".to_string();
    assert_eq!(user.full_name(), "Jane Doe");
  }
}
