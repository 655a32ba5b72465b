use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    access::parse_id,
    error::{ApiError, ApiResult},
};

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;
/// Largest value the `NUMERIC(12, 2)` price column holds.
pub const MAX_PRICE: f64 = 9_999_999_999.99;

// --- Listings ---

/// Car
///
/// A marketplace listing as returned to clients, with its images attached.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Car {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub car_type: String,
    pub make: String,
    pub model: String,
    pub year: Option<i32>,
    pub color: String,
    pub mileage: Option<i32>,
    pub price: f64,
    pub description: String,
    pub available: bool,
    // Bound to the authenticated subject at creation; never taken from a payload.
    pub owner_id: Uuid,
    pub location: String,
    pub reviews_count: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    pub images: Vec<Image>,
}

/// Raw `cars` row. `price` is selected as `price::float8`.
#[derive(Debug, Clone, FromRow)]
pub struct CarRow {
    pub id: Uuid,
    #[sqlx(rename = "type")]
    pub car_type: String,
    pub make: String,
    pub model: String,
    pub year: Option<i32>,
    pub color: String,
    pub mileage: Option<i32>,
    pub price: f64,
    pub description: String,
    pub available: bool,
    pub owner_id: Uuid,
    pub location: String,
    pub reviews_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CarRow {
    pub fn into_car(self, images: Vec<Image>) -> Car {
        Car {
            id: self.id,
            car_type: self.car_type,
            make: self.make,
            model: self.model,
            year: self.year,
            color: self.color,
            mileage: self.mileage,
            price: self.price,
            description: self.description,
            available: self.available,
            owner_id: self.owner_id,
            location: self.location,
            reviews_count: self.reviews_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
            images,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Image {
    pub id: Uuid,
    pub car_id: Uuid,
    pub filename: String,
    #[ts(type = "string")]
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct SavedCar {
    pub id: Uuid,
    pub user_id: Uuid,
    pub car_id: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Comment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub car_id: Uuid,
    pub content: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

// --- Messaging ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub read: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The other participant, seen from `user_id`.
    pub fn counterpart(&self, user_id: Uuid) -> Uuid {
        if self.sender_id == user_id {
            self.recipient_id
        } else {
            self.sender_id
        }
    }
}

/// MessageGroup
///
/// One conversation: every message exchanged between the caller and `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MessageGroup {
    pub user_id: Uuid,
    pub messages: Vec<Message>,
}

impl MessageGroup {
    /// Groups `messages` by counterpart. Groups keep the order in which their first
    /// message appears; messages keep their input order.
    pub fn group_by_counterpart(user_id: Uuid, messages: Vec<Message>) -> Vec<MessageGroup> {
        let mut groups: Vec<MessageGroup> = Vec::new();
        for message in messages {
            let other = message.counterpart(user_id);
            match groups.iter_mut().find(|g| g.user_id == other) {
                Some(group) => group.messages.push(message),
                None => groups.push(MessageGroup {
                    user_id: other,
                    messages: vec![message],
                }),
            }
        }
        groups
    }
}

// --- Notifications ---

/// Which slice of a user's notifications to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationFeed {
    All,
    Unread,
}

/// Raw `notifications` row, shared by every notification query.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    pub notification_type: String,
    pub message: String,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub message: String,
    pub seen: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            notification_type: row.notification_type,
            message: row.message,
            seen: row.seen,
            created_at: row.created_at,
        }
    }
}

/// Device platforms accepted for push tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Android,
    Ios,
    Web,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "andr",
            Platform::Ios => "ios",
            Platform::Web => "web",
        }
    }
}

impl FromStr for Platform {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "andr" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "web" => Ok(Platform::Web),
            _ => Err(ApiError::invalid("invalid platform")),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct NotificationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    /// One of `andr`, `ios`, `web`.
    pub platform: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

// --- Request Payloads ---

/// CreateCarRequest
///
/// Input for `POST /v1/cars`. There is no owner field: the owner is the caller.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct CreateCarRequest {
    #[serde(rename = "type")]
    pub car_type: String,
    pub make: String,
    pub model: String,
    pub year: Option<i32>,
    pub color: String,
    pub mileage: Option<i32>,
    pub price: f64,
    pub description: String,
    pub location: String,
}

impl CreateCarRequest {
    pub fn validate(&self) -> ApiResult<()> {
        validate_price(self.price, "price")?;
        validate_vehicle(self.year, self.mileage)
    }
}

/// UpdateCarRequest
///
/// Partial update for `PUT /v1/cars/{id}`; absent fields keep their stored value.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateCarRequest {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub car_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mileage: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl UpdateCarRequest {
    pub fn validate(&self) -> ApiResult<()> {
        if let Some(price) = self.price {
            validate_price(price, "price")?;
        }
        validate_vehicle(self.year, self.mileage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceOrder {
    Asc,
    Desc,
}

/// ListCarsFilter
///
/// Query parameters for `GET /v1/cars`. All filters are optional.
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
pub struct ListCarsFilter {
    #[serde(rename = "type")]
    pub car_type: Option<String>,
    pub location: Option<String>,
    /// `asc` or `desc`.
    pub price_order: Option<String>,
    pub min_price: Option<f64>,
    /// `0` means no upper bound.
    pub max_price: Option<f64>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    /// Only listings owned by this user.
    pub user_id: Option<String>,
}

/// Validated form of `ListCarsFilter`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CarQuery {
    pub car_type: Option<String>,
    pub location: Option<String>,
    pub price_order: Option<PriceOrder>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub owner_id: Option<Uuid>,
    pub offset: i64,
    pub limit: i64,
}

impl ListCarsFilter {
    pub fn validate(self) -> ApiResult<CarQuery> {
        let owner_id = match self.user_id.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => Some(parse_id(raw, "user")?),
            None => None,
        };

        let min_price = self.min_price.filter(|p| *p != 0.0);
        let max_price = self.max_price.filter(|p| *p != 0.0);
        if let Some(min) = min_price {
            validate_price(min, "min_price")?;
        }
        if let Some(max) = max_price {
            validate_price(max, "max_price")?;
        }
        if let (Some(min), Some(max)) = (min_price, max_price) {
            if min > max {
                return Err(ApiError::invalid(
                    "max_price must be greater than min_price",
                ));
            }
        }

        let price_order = match self.price_order.as_deref().filter(|s| !s.is_empty()) {
            None => None,
            Some("asc") => Some(PriceOrder::Asc),
            Some("desc") => Some(PriceOrder::Desc),
            Some(_) => return Err(ApiError::invalid("price_order must be 'asc' or 'desc'")),
        };

        let (offset, limit) = validate_page(self.offset, self.limit)?;

        Ok(CarQuery {
            car_type: self.car_type.filter(|s| !s.is_empty()),
            location: self.location.filter(|s| !s.is_empty()),
            price_order,
            min_price,
            max_price,
            owner_id,
            offset,
            limit,
        })
    }
}

/// SearchCarFilter
///
/// Query parameters for `GET /v1/cars/search`: case-insensitive match on make, model,
/// type, color, location and description.
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
pub struct SearchCarFilter {
    pub query: Option<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CarSearch {
    pub query: String,
    pub offset: i64,
    pub limit: i64,
}

impl SearchCarFilter {
    pub fn validate(self) -> ApiResult<CarSearch> {
        let query = self
            .query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ApiError::invalid("query must not be empty"))?;
        let (offset, limit) = validate_page(self.offset, self.limit)?;
        Ok(CarSearch {
            query,
            offset,
            limit,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SaveCarRequest {
    pub car_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AddImageRequest {
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    pub car_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateCommentRequest {
    pub content: String,
}

/// SendMessageRequest
///
/// The sender is always the caller, so only the recipient is supplied.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SendMessageRequest {
    pub recipient_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateNotificationRequest {
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterNotificationTokenRequest {
    pub token: String,
    /// One of `andr`, `ios`, `web`.
    pub platform: String,
}

/// Rejects blank text fields.
pub fn require_text<'a>(value: &'a str, field: &str) -> ApiResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid(format!("{field} must not be empty")));
    }
    Ok(trimmed)
}

fn validate_price(price: f64, field: &str) -> ApiResult<()> {
    if !(0.0..=MAX_PRICE).contains(&price) {
        return Err(ApiError::invalid(format!("invalid {field} value")));
    }
    Ok(())
}

fn validate_vehicle(year: Option<i32>, mileage: Option<i32>) -> ApiResult<()> {
    if year.is_some_and(|y| y < 0) {
        return Err(ApiError::invalid("invalid year value"));
    }
    if mileage.is_some_and(|m| m < 0) {
        return Err(ApiError::invalid("invalid mileage value"));
    }
    Ok(())
}

fn validate_page(offset: Option<i64>, limit: Option<i64>) -> ApiResult<(i64, i64)> {
    let offset = offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::invalid("offset must not be negative"));
    }
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(ApiError::invalid(format!(
            "limit must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }
    Ok((offset, limit))
}
