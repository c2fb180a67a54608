//! Card entities shared by the fetch client, the persistence gateway and the
//! sync protocol.
//!
//! The same types are used for the upstream payload and for the client-facing
//! sync response. Server-assigned fields (`created_at`, `updated_at`, child row
//! ids) are `None` on records that have not been persisted yet, and binary image
//! payloads are never serialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A card and everything it owns.
///
/// # Examples
///
/// ```
/// use duel_core::Card;
///
/// let json = r#"{
///     "id": 46986414,
///     "name": "Dark Magician",
///     "type": "Normal Monster",
///     "frameType": "normal",
///     "desc": "The ultimate wizard in terms of attack and defense.",
///     "atk": 2500,
///     "def": 2100,
///     "level": 7,
///     "race": "Spellcaster",
///     "attribute": "DARK"
/// }"#;
///
/// let card: Card = serde_json::from_str(json).unwrap();
/// assert_eq!(card.id, 46986414);
/// assert_eq!(card.atk, Some(2500));
/// assert!(card.card_sets.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Card {
    #[serde(deserialize_with = "number_or_string")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub card_type: String,
    #[serde(rename = "frameType", default)]
    pub frame_type: String,
    #[serde(rename = "desc", default)]
    pub description: String,
    #[serde(default)]
    pub atk: Option<i32>,
    #[serde(default)]
    pub def: Option<i32>,
    #[serde(default)]
    pub level: Option<i32>,
    #[serde(default)]
    pub race: String,
    #[serde(default)]
    pub attribute: String,
    #[serde(default)]
    pub card_sets: Vec<CardSet>,
    #[serde(default)]
    pub card_images: Vec<CardImage>,
    #[serde(default)]
    pub card_prices: Vec<CardPrice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One print of a card in a specific set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[serde(default)]
    pub set_name: String,
    #[serde(default)]
    pub set_code: String,
    #[serde(default)]
    pub set_rarity: String,
    #[serde(default)]
    pub set_rarity_code: String,
    #[serde(default)]
    pub set_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One artwork slot of a card.
///
/// Upstream records only carry the three URLs. The binary fields are filled by
/// the refresh pipeline and stay `None` when a download fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub image_url_small: String,
    #[serde(default)]
    pub image_url_cropped: String,
    #[serde(skip)]
    pub image_data: Option<Vec<u8>>,
    #[serde(skip)]
    pub image_small_data: Option<Vec<u8>>,
    #[serde(skip)]
    pub image_cropped_data: Option<Vec<u8>>,
    #[serde(skip)]
    pub content_type: Option<String>,
    #[serde(skip)]
    pub file_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Marketplace price snapshot. Upstream prices are preformatted strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardPrice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[serde(default)]
    pub cardmarket_price: Option<String>,
    #[serde(default)]
    pub tcgplayer_price: Option<String>,
    #[serde(default)]
    pub ebay_price: Option<String>,
    #[serde(default)]
    pub amazon_price: Option<String>,
    #[serde(default)]
    pub coolstuffinc_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Envelope returned by the upstream dataset endpoint.
///
/// Records are kept as raw JSON until [`Dataset::into_records`] decodes them
/// one by one, so a single malformed entry cannot reject the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

impl Dataset {
    pub fn into_records(self) -> Vec<DatasetRecord> {
        self.data.into_iter().map(DatasetRecord::decode).collect()
    }
}

/// One upstream entry: a decoded card or the reason it could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetRecord {
    Card(Card),
    Malformed {
        /// Raw `id` value of the entry, when it had one.
        id: Option<String>,
        error: String,
    },
}

impl DatasetRecord {
    pub fn decode(value: serde_json::Value) -> Self {
        let id = value.get("id").map(|v| v.to_string());
        match serde_json::from_value::<Card>(value) {
            Ok(card) => DatasetRecord::Card(card),
            Err(e) => DatasetRecord::Malformed {
                id,
                error: e.to_string(),
            },
        }
    }

    pub fn into_card(self) -> Option<Card> {
        match self {
            DatasetRecord::Card(card) => Some(card),
            DatasetRecord::Malformed { .. } => None,
        }
    }
}

impl From<Card> for DatasetRecord {
    fn from(card: Card) -> Self {
        DatasetRecord::Card(card)
    }
}

/// Bytes of one downloaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub data: Vec<u8>,
    pub content_type: String,
    pub size: usize,
}

/// Body of `POST /api/v1/cards/sync`.
///
/// A missing or `null` `last_update` reads as empty, i.e. a first-time client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub last_update: String,
}

/// Cards to apply on the client plus the watermark for the next call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub cards: Vec<Card>,
    pub last_update: String,
    pub total_cards: usize,
}

/// Body of `GET /api/v1/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub cards_count: i64,
}

impl HealthStatus {
    pub fn healthy(cards_count: i64) -> Self {
        Self {
            status: "healthy".to_string(),
            cards_count,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Upstream identifiers are usually numbers but some mirrors quote them.
fn number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_card_deserialization_full() {
        let json = json!({
            "id": 6983839,
            "name": "Tornado Dragon",
            "type": "XYZ Monster",
            "frameType": "xyz",
            "desc": "2 Level 4 monsters",
            "atk": 2100,
            "def": 2000,
            "level": 4,
            "race": "Wyrm",
            "attribute": "WIND",
            "card_sets": [{
                "set_name": "Battles of Legend: Relentless Revenge",
                "set_code": "BLRR-EN084",
                "set_rarity": "Secret Rare",
                "set_rarity_code": "(ScR)",
                "set_price": "4.08"
            }],
            "card_images": [{
                "id": 6983839,
                "image_url": "https://images.example.com/cards/6983839.jpg",
                "image_url_small": "https://images.example.com/cards_small/6983839.jpg",
                "image_url_cropped": "https://images.example.com/cards_cropped/6983839.jpg"
            }],
            "card_prices": [{
                "cardmarket_price": "0.42",
                "tcgplayer_price": "0.48",
                "ebay_price": "2.99",
                "amazon_price": "0.77",
                "coolstuffinc_price": "0.99"
            }]
        });

        let card: Card = serde_json::from_value(json).unwrap();
        assert_eq!(card.id, 6983839);
        assert_eq!(card.card_type, "XYZ Monster");
        assert_eq!(card.frame_type, "xyz");
        assert_eq!(card.description, "2 Level 4 monsters");
        assert_eq!(card.card_sets.len(), 1);
        assert_eq!(card.card_sets[0].set_price.as_deref(), Some("4.08"));
        assert_eq!(card.card_images.len(), 1);
        assert!(card.card_images[0].image_data.is_none());
        assert_eq!(
            card.card_prices[0].coolstuffinc_price.as_deref(),
            Some("0.99")
        );
        assert!(card.created_at.is_none());
    }

    #[test]
    fn test_card_optional_stats_absent() {
        let json = json!({
            "id": 12580477,
            "name": "Raigeki",
            "type": "Spell Card",
            "frameType": "spell",
            "desc": "Destroy all monsters your opponent controls.",
            "race": "Normal"
        });

        let card: Card = serde_json::from_value(json).unwrap();
        assert_eq!(card.atk, None);
        assert_eq!(card.def, None);
        assert_eq!(card.level, None);
        assert_eq!(card.attribute, "");
    }

    #[test]
    fn test_card_id_as_string() {
        let json = json!({ "id": " 89631139 ", "name": "Blue-Eyes White Dragon" });
        let card: Card = serde_json::from_value(json).unwrap();
        assert_eq!(card.id, 89631139);
    }

    #[test]
    fn test_card_id_invalid_string() {
        let json = json!({ "id": "not-a-number", "name": "Broken" });
        assert!(serde_json::from_value::<Card>(json).is_err());
    }

    #[test]
    fn test_price_three_states() {
        let json = json!({ "cardmarket_price": "", "tcgplayer_price": "1.00" });
        let price: CardPrice = serde_json::from_value(json).unwrap();
        assert_eq!(price.cardmarket_price.as_deref(), Some(""));
        assert_eq!(price.tcgplayer_price.as_deref(), Some("1.00"));
        assert_eq!(price.ebay_price, None);
    }

    #[test]
    fn test_image_binary_not_serialized() {
        let image = CardImage {
            image_url: "https://images.example.com/1.jpg".to_string(),
            image_data: Some(vec![0xff, 0xd8, 0xff]),
            content_type: Some("image/jpeg".to_string()),
            file_size: Some(3),
            ..Default::default()
        };

        let value = serde_json::to_value(&image).unwrap();
        assert_eq!(value["image_url"], "https://images.example.com/1.jpg");
        assert!(value.get("image_data").is_none());
        assert!(value.get("content_type").is_none());
        assert!(value.get("file_size").is_none());
    }

    #[test]
    fn test_card_serializes_upstream_field_names() {
        let card = Card {
            id: 1,
            name: "Kuriboh".to_string(),
            card_type: "Effect Monster".to_string(),
            frame_type: "effect".to_string(),
            description: "Discard this card".to_string(),
            ..Default::default()
        };

        let value = serde_json::to_value(&card).unwrap();
        assert_eq!(value["type"], "Effect Monster");
        assert_eq!(value["frameType"], "effect");
        assert_eq!(value["desc"], "Discard this card");
        assert!(value.get("updated_at").is_none());
    }

    #[test]
    fn test_dataset_envelope() {
        let json = r#"{"data": [{"id": 1, "name": "A"}, {"id": 2, "name": "B"}]}"#;
        let dataset: Dataset = serde_json::from_str(json).unwrap();
        let cards: Vec<Card> = dataset
            .into_records()
            .into_iter()
            .filter_map(DatasetRecord::into_card)
            .collect();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[1].name, "B");
    }

    #[test]
    fn test_dataset_card_without_name() {
        let json = r#"{"data":[{"id":1,"name":"A"},{"id":2},{"id":3,"name":"C"}]}"#;
        let dataset: Dataset = serde_json::from_str(json).unwrap();
        let records = dataset.into_records();

        assert_eq!(records.len(), 3);
        let second = records[1].clone().into_card().unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(second.name, "");
    }

    #[test]
    fn test_dataset_malformed_record_kept_apart() {
        let json = r#"{"data":[{"id":1,"name":"A"},{"id":"abc","name":"B"},{"name":"no id"},{"id":4}]}"#;
        let dataset: Dataset = serde_json::from_str(json).unwrap();
        let records = dataset.into_records();

        assert_eq!(records.len(), 4);
        assert!(matches!(&records[0], DatasetRecord::Card(c) if c.id == 1));
        assert!(matches!(
            &records[1],
            DatasetRecord::Malformed { id: Some(id), .. } if id == "\"abc\""
        ));
        assert!(matches!(&records[2], DatasetRecord::Malformed { id: None, .. }));
        assert!(matches!(&records[3], DatasetRecord::Card(c) if c.id == 4));
    }

    #[test]
    fn test_sync_request_missing_or_null_is_empty() {
        let missing: SyncRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.last_update, "");

        let null: SyncRequest = serde_json::from_str(r#"{"last_update": null}"#).unwrap();
        assert_eq!(null.last_update, "");

        let set: SyncRequest =
            serde_json::from_str(r#"{"last_update": "2024-05-01T10:00:00Z"}"#).unwrap();
        assert_eq!(set.last_update, "2024-05-01T10:00:00Z");

        assert!(serde_json::from_str::<SyncRequest>(r#"{"last_update": 5}"#).is_err());
    }

    #[test]
    fn test_health_status_healthy() {
        let status = HealthStatus::healthy(42);
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["cards_count"], 42);
    }
}
