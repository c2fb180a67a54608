//! Card repository for PostgreSQL.
//!
//! A card and its three child collections are written in one transaction.
//! Reads load the card row first and then each child table with its own query.
//! Image bytes are write-only from this side: reads return URLs, content type
//! and size, never the blobs.

use chrono::{DateTime, Utc};
use duel_core::config::DbConfig;
use duel_core::error::AppError;
use duel_core::models::{Card, CardImage, CardPrice, CardSet};
use duel_core::traits::CardStore;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Pool, Postgres, Transaction};
use tracing::debug;

/// Column list for card SELECT queries. Must remain a const literal to ensure
/// SQL safety since format!() bypasses sqlx compile-time validation.
const CARD_COLUMNS: &str =
    "id, name, type, frame_type, description, atk, def, level, race, attribute, created_at, updated_at";

/// Child tables cleared on every upsert.
const CHILD_TABLES: [&str; 3] = ["card_sets", "card_images", "card_prices"];

/// Opens a connection pool from discrete connection settings.
///
/// # Examples
///
/// ```no_run
/// use duel_core::DbConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DbConfig::new("localhost", 5432, "duel", "postgres", "postgres");
/// let pool = duel_db::connect(&config).await?;
/// duel_db::migrate(&pool).await?;
/// # Ok(())
/// # }
/// ```
pub async fn connect(config: &DbConfig) -> Result<PgPool, AppError> {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .password(&config.password);

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .map_err(AppError::DatabaseError)
}

/// Applies the embedded schema migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.into()))
}

/// Repository for card persistence in PostgreSQL.
#[derive(Clone)]
pub struct CardRepository {
    pool: Pool<Postgres>,
}

impl CardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_card_row(
        tx: &mut Transaction<'_, Postgres>,
        card: &Card,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO cards (id, name, type, frame_type, description, atk, def, level, race, attribute)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                type = EXCLUDED.type,
                frame_type = EXCLUDED.frame_type,
                description = EXCLUDED.description,
                atk = EXCLUDED.atk,
                def = EXCLUDED.def,
                level = EXCLUDED.level,
                race = EXCLUDED.race,
                attribute = EXCLUDED.attribute,
                updated_at = NOW()
            "#,
        )
        .bind(card.id)
        .bind(&card.name)
        .bind(&card.card_type)
        .bind(&card.frame_type)
        .bind(&card.description)
        .bind(card.atk)
        .bind(card.def)
        .bind(card.level)
        .bind(&card.race)
        .bind(&card.attribute)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_card_set(
        tx: &mut Transaction<'_, Postgres>,
        card_id: i64,
        set: &CardSet,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO card_sets (card_id, set_name, set_code, set_rarity, set_rarity_code, set_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(card_id)
        .bind(&set.set_name)
        .bind(&set.set_code)
        .bind(&set.set_rarity)
        .bind(&set.set_rarity_code)
        .bind(&set.set_price)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_card_image(
        tx: &mut Transaction<'_, Postgres>,
        card_id: i64,
        image: &CardImage,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO card_images (card_id, image_url, image_url_small, image_url_cropped,
                                     image_data, image_small_data, image_cropped_data, content_type, file_size)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(card_id)
        .bind(&image.image_url)
        .bind(&image.image_url_small)
        .bind(&image.image_url_cropped)
        .bind(image.image_data.as_deref())
        .bind(image.image_small_data.as_deref())
        .bind(image.image_cropped_data.as_deref())
        .bind(&image.content_type)
        .bind(image.file_size)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_card_price(
        tx: &mut Transaction<'_, Postgres>,
        card_id: i64,
        price: &CardPrice,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO card_prices (card_id, cardmarket_price, tcgplayer_price, ebay_price, amazon_price, coolstuffinc_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(card_id)
        .bind(&price.cardmarket_price)
        .bind(&price.tcgplayer_price)
        .bind(&price.ebay_price)
        .bind(&price.amazon_price)
        .bind(&price.coolstuffinc_price)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Fills the three child collections of `card`.
    async fn load_children(&self, card: &mut Card) -> Result<(), AppError> {
        card.card_sets = sqlx::query_as::<_, CardSetRow>(
            r#"
            SELECT id, set_name, set_code, set_rarity, set_rarity_code, set_price, created_at
            FROM card_sets WHERE card_id = $1 ORDER BY id
            "#,
        )
        .bind(card.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| step_error("load card sets", "card_sets", source))?
        .into_iter()
        .map(CardSet::from)
        .collect();

        card.card_images = sqlx::query_as::<_, CardImageRow>(
            r#"
            SELECT id, image_url, image_url_small, image_url_cropped, content_type, file_size, created_at
            FROM card_images WHERE card_id = $1 ORDER BY id
            "#,
        )
        .bind(card.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| step_error("load card images", "card_images", source))?
        .into_iter()
        .map(CardImage::from)
        .collect();

        card.card_prices = sqlx::query_as::<_, CardPriceRow>(
            r#"
            SELECT id, cardmarket_price, tcgplayer_price, ebay_price, amazon_price, coolstuffinc_price,
                   created_at, updated_at
            FROM card_prices WHERE card_id = $1 ORDER BY id
            "#,
        )
        .bind(card.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| step_error("load card prices", "card_prices", source))?
        .into_iter()
        .map(CardPrice::from)
        .collect();

        Ok(())
    }

    async fn populate(&self, rows: Vec<CardRow>) -> Result<Vec<Card>, AppError> {
        let mut cards = Vec::with_capacity(rows.len());
        for row in rows {
            let mut card = Card::from(row);
            self.load_children(&mut card).await?;
            cards.push(card);
        }
        Ok(cards)
    }
}

impl CardStore for CardRepository {
    /// Upserts the card row, then replaces every child row, in one transaction.
    /// Dropping the transaction on an early return rolls it back.
    async fn upsert_card(&self, card: &Card) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|source| step_error("begin transaction", "cards", source))?;

        Self::upsert_card_row(&mut tx, card)
            .await
            .map_err(|source| step_error("upsert card", "cards", source))?;

        for table in CHILD_TABLES {
            let query = format!("DELETE FROM {} WHERE card_id = $1", table);
            sqlx::query(&query)
                .bind(card.id)
                .execute(&mut *tx)
                .await
                .map_err(|source| step_error("delete child rows", table, source))?;
        }

        for set in &card.card_sets {
            Self::insert_card_set(&mut tx, card.id, set)
                .await
                .map_err(|source| step_error("insert card set", "card_sets", source))?;
        }

        for image in &card.card_images {
            Self::insert_card_image(&mut tx, card.id, image)
                .await
                .map_err(|source| step_error("insert card image", "card_images", source))?;
        }

        for price in &card.card_prices {
            Self::insert_card_price(&mut tx, card.id, price)
                .await
                .map_err(|source| step_error("insert card price", "card_prices", source))?;
        }

        tx.commit()
            .await
            .map_err(|source| step_error("commit", "cards", source))?;

        debug!(
            "Upserted card {} with {} sets, {} images, {} prices",
            card.id,
            card.card_sets.len(),
            card.card_images.len(),
            card.card_prices.len()
        );
        Ok(())
    }

    async fn get_card(&self, id: i64) -> Result<Option<Card>, AppError> {
        let query = format!("SELECT {} FROM cards WHERE id = $1", CARD_COLUMNS);
        let row = sqlx::query_as::<_, CardRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| step_error("get card", "cards", source))?;

        match row {
            Some(row) => {
                let mut card = Card::from(row);
                self.load_children(&mut card).await?;
                Ok(Some(card))
            }
            None => Ok(None),
        }
    }

    async fn card_count(&self) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cards")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(count)
    }

    async fn all_cards(&self) -> Result<Vec<Card>, AppError> {
        let query = format!("SELECT {} FROM cards ORDER BY id", CARD_COLUMNS);
        let rows = sqlx::query_as::<_, CardRow>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|source| step_error("get all cards", "cards", source))?;

        self.populate(rows).await
    }

    async fn cards_updated_since(&self, since: DateTime<Utc>) -> Result<Vec<Card>, AppError> {
        let query = format!(
            "SELECT {} FROM cards WHERE updated_at > $1 OR created_at > $1 ORDER BY updated_at DESC",
            CARD_COLUMNS
        );
        let rows = sqlx::query_as::<_, CardRow>(&query)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(|source| step_error("get updated cards", "cards", source))?;

        self.populate(rows).await
    }
}

fn step_error(step: &'static str, table: &'static str, source: sqlx::Error) -> AppError {
    AppError::PersistenceError {
        step,
        table,
        source,
    }
}

/// Helper struct for deserializing card rows
#[derive(sqlx::FromRow)]
struct CardRow {
    id: i64,
    name: String,
    #[sqlx(rename = "type")]
    card_type: String,
    frame_type: String,
    description: String,
    atk: Option<i32>,
    def: Option<i32>,
    level: Option<i32>,
    race: String,
    attribute: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CardRow> for Card {
    fn from(row: CardRow) -> Self {
        Card {
            id: row.id,
            name: row.name,
            card_type: row.card_type,
            frame_type: row.frame_type,
            description: row.description,
            atk: row.atk,
            def: row.def,
            level: row.level,
            race: row.race,
            attribute: row.attribute,
            card_sets: Vec::new(),
            card_images: Vec::new(),
            card_prices: Vec::new(),
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CardSetRow {
    id: i32,
    set_name: String,
    set_code: String,
    set_rarity: String,
    set_rarity_code: String,
    set_price: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CardSetRow> for CardSet {
    fn from(row: CardSetRow) -> Self {
        CardSet {
            id: Some(row.id),
            set_name: row.set_name,
            set_code: row.set_code,
            set_rarity: row.set_rarity,
            set_rarity_code: row.set_rarity_code,
            set_price: row.set_price,
            created_at: Some(row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CardImageRow {
    id: i32,
    image_url: String,
    image_url_small: String,
    image_url_cropped: String,
    content_type: Option<String>,
    file_size: Option<i32>,
    created_at: DateTime<Utc>,
}

impl From<CardImageRow> for CardImage {
    fn from(row: CardImageRow) -> Self {
        CardImage {
            id: Some(row.id),
            image_url: row.image_url,
            image_url_small: row.image_url_small,
            image_url_cropped: row.image_url_cropped,
            image_data: None,
            image_small_data: None,
            image_cropped_data: None,
            content_type: row.content_type,
            file_size: row.file_size,
            created_at: Some(row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CardPriceRow {
    id: i32,
    cardmarket_price: Option<String>,
    tcgplayer_price: Option<String>,
    ebay_price: Option<String>,
    amazon_price: Option<String>,
    coolstuffinc_price: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CardPriceRow> for CardPrice {
    fn from(row: CardPriceRow) -> Self {
        CardPrice {
            id: Some(row.id),
            cardmarket_price: row.cardmarket_price,
            tcgplayer_price: row.tcgplayer_price,
            ebay_price: row.ebay_price,
            amazon_price: row.amazon_price,
            coolstuffinc_price: row.coolstuffinc_price,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_repository() {
        assert_eq!(
            std::mem::size_of::<CardRepository>(),
            std::mem::size_of::<PgPool>()
        );
    }

    #[test]
    fn test_child_tables_cover_all_children() {
        assert_eq!(CHILD_TABLES, ["card_sets", "card_images", "card_prices"]);
    }

    #[test]
    fn test_card_row_conversion() {
        let now = Utc::now();
        let card = Card::from(CardRow {
            id: 89631139,
            name: "Blue-Eyes White Dragon".to_string(),
            card_type: "Normal Monster".to_string(),
            frame_type: "normal".to_string(),
            description: "This legendary dragon is a powerful engine of destruction.".to_string(),
            atk: Some(3000),
            def: Some(2500),
            level: Some(8),
            race: "Dragon".to_string(),
            attribute: "LIGHT".to_string(),
            created_at: now,
            updated_at: now,
        });

        assert_eq!(card.id, 89631139);
        assert_eq!(card.card_type, "Normal Monster");
        assert!(card.card_sets.is_empty());
        assert_eq!(card.updated_at, Some(now));
    }

    #[test]
    fn test_image_row_has_no_blobs() {
        let image = CardImage::from(CardImageRow {
            id: 1,
            image_url: "https://images.example.com/1.jpg".to_string(),
            image_url_small: String::new(),
            image_url_cropped: String::new(),
            content_type: Some("image/jpeg".to_string()),
            file_size: Some(1024),
            created_at: Utc::now(),
        });

        assert!(image.image_data.is_none());
        assert_eq!(image.file_size, Some(1024));
    }

    #[test]
    fn test_write_error_context() {
        let err = step_error("insert card set", "card_sets", sqlx::Error::PoolClosed);
        assert!(err.to_string().contains("card_sets"));
    }
}
