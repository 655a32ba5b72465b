use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use uuid::Uuid;

use crate::{
    access::{OwnershipStore, ResourceKind},
    models::{
        Car, CarQuery, CarRow, CarSearch, Comment, CreateCarRequest, Image, Message,
        Notification, NotificationFeed, NotificationRow, NotificationToken, Platform,
        PriceOrder, SavedCar, UpdateCarRequest,
    },
};

pub type RepoResult<T> = Result<T, sqlx::Error>;

/// Repository Trait
///
/// The persistence contract used by every handler. No method performs an
/// authorization check: callers verify ownership before invoking a mutation.
///
/// `Send + Sync + async_trait` make `Arc<dyn Repository>` shareable across Axum's
/// task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Cars ---
    async fn create_car(&self, owner_id: Uuid, req: &CreateCarRequest) -> RepoResult<Car>;
    async fn get_car(&self, id: Uuid) -> RepoResult<Option<Car>>;
    async fn car_exists(&self, id: Uuid) -> RepoResult<bool>;
    async fn list_cars(&self, query: &CarQuery) -> RepoResult<Vec<Car>>;
    async fn search_cars(&self, search: &CarSearch) -> RepoResult<Vec<Car>>;
    // Partial update; absent fields keep their value.
    async fn update_car(&self, id: Uuid, req: &UpdateCarRequest) -> RepoResult<Option<Car>>;
    async fn delete_car(&self, id: Uuid) -> RepoResult<bool>;
    async fn increment_review_count(&self, id: Uuid) -> RepoResult<bool>;

    // --- Images ---
    async fn add_image(&self, car_id: Uuid, filename: &str) -> RepoResult<Image>;
    async fn get_images_by_car(&self, car_id: Uuid) -> RepoResult<Vec<Image>>;
    async fn get_image(&self, id: Uuid) -> RepoResult<Option<Image>>;
    async fn delete_image(&self, id: Uuid) -> RepoResult<bool>;
    async fn delete_images_by_car(&self, car_id: Uuid) -> RepoResult<u64>;

    // --- Saved cars ---
    // Saving the same car twice returns the existing row.
    async fn save_car(&self, user_id: Uuid, car_id: Uuid) -> RepoResult<SavedCar>;
    async fn get_saved_cars(&self, user_id: Uuid) -> RepoResult<Vec<SavedCar>>;
    async fn delete_saved_car(&self, id: Uuid) -> RepoResult<bool>;
    async fn delete_saved_cars_by_car(&self, car_id: Uuid) -> RepoResult<u64>;

    // --- Comments ---
    async fn create_comment(&self, user_id: Uuid, car_id: Uuid, content: &str)
    -> RepoResult<Comment>;
    async fn get_comments_by_car(&self, car_id: Uuid) -> RepoResult<Vec<Comment>>;
    async fn update_comment(&self, id: Uuid, content: &str) -> RepoResult<Option<Comment>>;
    async fn delete_comment(&self, id: Uuid) -> RepoResult<bool>;
    async fn delete_comments_by_car(&self, car_id: Uuid) -> RepoResult<u64>;

    // --- Messages ---
    async fn create_message(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        content: &str,
    ) -> RepoResult<Message>;
    // Every message the user sent or received, newest first.
    async fn get_messages_for_user(&self, user_id: Uuid) -> RepoResult<Vec<Message>>;
    // Both directions between the two users, oldest first.
    async fn get_conversation(&self, user_id: Uuid, other_id: Uuid) -> RepoResult<Vec<Message>>;
    async fn mark_message_read(&self, id: Uuid) -> RepoResult<bool>;
    async fn delete_message(&self, id: Uuid) -> RepoResult<bool>;

    // --- Notifications ---
    async fn create_notification(
        &self,
        user_id: Uuid,
        notification_type: &str,
        message: &str,
    ) -> RepoResult<Notification>;
    async fn get_notifications(
        &self,
        user_id: Uuid,
        feed: NotificationFeed,
    ) -> RepoResult<Vec<Notification>>;
    async fn mark_notification_read(&self, id: Uuid) -> RepoResult<bool>;
    async fn delete_notification(&self, id: Uuid) -> RepoResult<bool>;

    // --- Notification tokens ---
    /// Inserts `token` for `user_id`, or refreshes the platform when the same user
    /// registers it again. `None` when the token is already held by another user.
    async fn register_token(
        &self,
        user_id: Uuid,
        token: &str,
        platform: Platform,
    ) -> RepoResult<Option<NotificationToken>>;
    async fn get_tokens_by_user(&self, user_id: Uuid) -> RepoResult<Vec<NotificationToken>>;
    async fn delete_token(&self, id: Uuid) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The shared handle stored in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

const CAR_COLUMNS: &str = "id, type, make, model, year, color, mileage, price::float8 AS price, \
     description, available, owner_id, location, reviews_count, created_at, updated_at";

const IMAGE_COLUMNS: &str = "id, car_id, filename, uploaded_at";
const SAVED_CAR_COLUMNS: &str = "id, user_id, car_id, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, user_id, car_id, content, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, content, read, created_at";
const NOTIFICATION_COLUMNS: &str = "id, user_id, type, message, seen, created_at";
const TOKEN_COLUMNS: &str = "id, user_id, token, platform, created_at, updated_at";

/// `%term%` for `ILIKE ... ESCAPE '\'`, with the term's own wildcards escaped.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// PostgresRepository
///
/// `Repository` and `OwnershipStore` over a `PgPool`.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads the images of every car in `rows` with one query and attaches them.
    async fn attach_images(&self, rows: Vec<CarRow>) -> RepoResult<Vec<Car>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE car_id = ANY($1) ORDER BY uploaded_at"
        );
        let images = sqlx::query_as::<_, Image>(&sql)
            .bind(&ids[..])
            .fetch_all(&self.pool)
            .await?;

        let mut by_car: HashMap<Uuid, Vec<Image>> = HashMap::new();
        for image in images {
            by_car.entry(image.car_id).or_default().push(image);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let images = by_car.remove(&row.id).unwrap_or_default();
                row.into_car(images)
            })
            .collect())
    }

    async fn execute_affects_row(&self, sql: &str, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query(sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_car(&self, owner_id: Uuid, req: &CreateCarRequest) -> RepoResult<Car> {
        let sql = format!(
            "INSERT INTO cars (type, make, model, year, color, mileage, price, description, owner_id, location) \
             VALUES ($1, $2, $3, $4, $5, $6, ROUND($7::numeric, 2), $8, $9, $10) \
             RETURNING {CAR_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CarRow>(&sql)
            .bind(&req.car_type)
            .bind(&req.make)
            .bind(&req.model)
            .bind(req.year)
            .bind(&req.color)
            .bind(req.mileage)
            .bind(req.price)
            .bind(&req.description)
            .bind(owner_id)
            .bind(&req.location)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into_car(Vec::new()))
    }

    async fn get_car(&self, id: Uuid) -> RepoResult<Option<Car>> {
        let sql = format!("SELECT {CAR_COLUMNS} FROM cars WHERE id = $1");
        let Some(row) = sqlx::query_as::<_, CarRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        Ok(self.attach_images(vec![row]).await?.pop())
    }

    async fn car_exists(&self, id: Uuid) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM cars WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
    }

    /// list_cars
    ///
    /// Dynamic filters are assembled with `QueryBuilder` so every value is bound.
    async fn list_cars(&self, query: &CarQuery) -> RepoResult<Vec<Car>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {CAR_COLUMNS} FROM cars WHERE TRUE"));

        if let Some(car_type) = &query.car_type {
            builder.push(" AND type = ");
            builder.push_bind(car_type);
        }
        if let Some(location) = &query.location {
            builder.push(" AND location = ");
            builder.push_bind(location);
        }
        if let Some(min) = query.min_price {
            builder.push(" AND price >= ");
            builder.push_bind(min);
            builder.push("::numeric");
        }
        if let Some(max) = query.max_price {
            builder.push(" AND price <= ");
            builder.push_bind(max);
            builder.push("::numeric");
        }
        if let Some(owner_id) = query.owner_id {
            builder.push(" AND owner_id = ");
            builder.push_bind(owner_id);
        }

        builder.push(match query.price_order {
            Some(PriceOrder::Asc) => " ORDER BY price ASC, created_at DESC",
            Some(PriceOrder::Desc) => " ORDER BY price DESC, created_at DESC",
            None => " ORDER BY created_at DESC",
        });
        builder.push(" LIMIT ");
        builder.push_bind(query.limit);
        builder.push(" OFFSET ");
        builder.push_bind(query.offset);

        let rows = builder
            .build_query_as::<CarRow>()
            .fetch_all(&self.pool)
            .await?;
        self.attach_images(rows).await
    }

    async fn search_cars(&self, search: &CarSearch) -> RepoResult<Vec<Car>> {
        let sql = format!(
            "SELECT {CAR_COLUMNS} FROM cars \
             WHERE make ILIKE $1 ESCAPE '\\' OR model ILIKE $1 ESCAPE '\\' \
                OR type ILIKE $1 ESCAPE '\\' OR color ILIKE $1 ESCAPE '\\' \
                OR location ILIKE $1 ESCAPE '\\' OR description ILIKE $1 ESCAPE '\\' \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let pattern = contains_pattern(&search.query);
        let rows = sqlx::query_as::<_, CarRow>(&sql)
            .bind(pattern)
            .bind(search.limit)
            .bind(search.offset)
            .fetch_all(&self.pool)
            .await?;
        self.attach_images(rows).await
    }

    async fn update_car(&self, id: Uuid, req: &UpdateCarRequest) -> RepoResult<Option<Car>> {
        let sql = format!(
            "UPDATE cars SET \
                type = COALESCE($2, type), \
                make = COALESCE($3, make), \
                model = COALESCE($4, model), \
                year = COALESCE($5, year), \
                color = COALESCE($6, color), \
                mileage = COALESCE($7, mileage), \
                price = COALESCE(ROUND($8::numeric, 2), price), \
                description = COALESCE($9, description), \
                available = COALESCE($10, available), \
                location = COALESCE($11, location), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {CAR_COLUMNS}"
        );
        let Some(row) = sqlx::query_as::<_, CarRow>(&sql)
            .bind(id)
            .bind(req.car_type.as_deref())
            .bind(req.make.as_deref())
            .bind(req.model.as_deref())
            .bind(req.year)
            .bind(req.color.as_deref())
            .bind(req.mileage)
            .bind(req.price)
            .bind(req.description.as_deref())
            .bind(req.available)
            .bind(req.location.as_deref())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        Ok(self.attach_images(vec![row]).await?.pop())
    }

    async fn delete_car(&self, id: Uuid) -> RepoResult<bool> {
        self.execute_affects_row("DELETE FROM cars WHERE id = $1", id)
            .await
    }

    async fn increment_review_count(&self, id: Uuid) -> RepoResult<bool> {
        self.execute_affects_row(
            "UPDATE cars SET reviews_count = reviews_count + 1 WHERE id = $1",
            id,
        )
        .await
    }

    async fn add_image(&self, car_id: Uuid, filename: &str) -> RepoResult<Image> {
        let sql = format!(
            "INSERT INTO images (car_id, filename) VALUES ($1, $2) RETURNING {IMAGE_COLUMNS}"
        );
        sqlx::query_as::<_, Image>(&sql)
            .bind(car_id)
            .bind(filename)
            .fetch_one(&self.pool)
            .await
    }

    async fn get_images_by_car(&self, car_id: Uuid) -> RepoResult<Vec<Image>> {
        let sql =
            format!("SELECT {IMAGE_COLUMNS} FROM images WHERE car_id = $1 ORDER BY uploaded_at");
        sqlx::query_as::<_, Image>(&sql)
            .bind(car_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn get_image(&self, id: Uuid) -> RepoResult<Option<Image>> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = $1");
        sqlx::query_as::<_, Image>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn delete_image(&self, id: Uuid) -> RepoResult<bool> {
        self.execute_affects_row("DELETE FROM images WHERE id = $1", id)
            .await
    }

    async fn delete_images_by_car(&self, car_id: Uuid) -> RepoResult<u64> {
        let result = sqlx::query("DELETE FROM images WHERE car_id = $1")
            .bind(car_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn save_car(&self, user_id: Uuid, car_id: Uuid) -> RepoResult<SavedCar> {
        let sql = format!(
            "INSERT INTO saved_cars (user_id, car_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, car_id) DO UPDATE SET updated_at = NOW() \
             RETURNING {SAVED_CAR_COLUMNS}"
        );
        sqlx::query_as::<_, SavedCar>(&sql)
            .bind(user_id)
            .bind(car_id)
            .fetch_one(&self.pool)
            .await
    }

    async fn get_saved_cars(&self, user_id: Uuid) -> RepoResult<Vec<SavedCar>> {
        let sql = format!(
            "SELECT {SAVED_CAR_COLUMNS} FROM saved_cars WHERE user_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, SavedCar>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn delete_saved_car(&self, id: Uuid) -> RepoResult<bool> {
        self.execute_affects_row("DELETE FROM saved_cars WHERE id = $1", id)
            .await
    }

    async fn delete_saved_cars_by_car(&self, car_id: Uuid) -> RepoResult<u64> {
        let result = sqlx::query("DELETE FROM saved_cars WHERE car_id = $1")
            .bind(car_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_comment(
        &self,
        user_id: Uuid,
        car_id: Uuid,
        content: &str,
    ) -> RepoResult<Comment> {
        let sql = format!(
            "INSERT INTO comments (user_id, car_id, content) VALUES ($1, $2, $3) \
             RETURNING {COMMENT_COLUMNS}"
        );
        sqlx::query_as::<_, Comment>(&sql)
            .bind(user_id)
            .bind(car_id)
            .bind(content)
            .fetch_one(&self.pool)
            .await
    }

    async fn get_comments_by_car(&self, car_id: Uuid) -> RepoResult<Vec<Comment>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE car_id = $1 ORDER BY created_at"
        );
        sqlx::query_as::<_, Comment>(&sql)
            .bind(car_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn update_comment(&self, id: Uuid, content: &str) -> RepoResult<Option<Comment>> {
        let sql = format!(
            "UPDATE comments SET content = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {COMMENT_COLUMNS}"
        );
        sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .bind(content)
            .fetch_optional(&self.pool)
            .await
    }

    async fn delete_comment(&self, id: Uuid) -> RepoResult<bool> {
        self.execute_affects_row("DELETE FROM comments WHERE id = $1", id)
            .await
    }

    async fn delete_comments_by_car(&self, car_id: Uuid) -> RepoResult<u64> {
        let result = sqlx::query("DELETE FROM comments WHERE car_id = $1")
            .bind(car_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_message(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        content: &str,
    ) -> RepoResult<Message> {
        let sql = format!(
            "INSERT INTO messages (sender_id, recipient_id, content) VALUES ($1, $2, $3) \
             RETURNING {MESSAGE_COLUMNS}"
        );
        sqlx::query_as::<_, Message>(&sql)
            .bind(sender_id)
            .bind(recipient_id)
            .bind(content)
            .fetch_one(&self.pool)
            .await
    }

    async fn get_messages_for_user(&self, user_id: Uuid) -> RepoResult<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE sender_id = $1 OR recipient_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Message>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn get_conversation(&self, user_id: Uuid, other_id: Uuid) -> RepoResult<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE (sender_id = $1 AND recipient_id = $2) \
                OR (sender_id = $2 AND recipient_id = $1) \
             ORDER BY created_at"
        );
        sqlx::query_as::<_, Message>(&sql)
            .bind(user_id)
            .bind(other_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn mark_message_read(&self, id: Uuid) -> RepoResult<bool> {
        self.execute_affects_row("UPDATE messages SET read = TRUE WHERE id = $1", id)
            .await
    }

    async fn delete_message(&self, id: Uuid) -> RepoResult<bool> {
        self.execute_affects_row("DELETE FROM messages WHERE id = $1", id)
            .await
    }

    async fn create_notification(
        &self,
        user_id: Uuid,
        notification_type: &str,
        message: &str,
    ) -> RepoResult<Notification> {
        let sql = format!(
            "INSERT INTO notifications (user_id, type, message) VALUES ($1, $2, $3) \
             RETURNING {NOTIFICATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(user_id)
            .bind(notification_type)
            .bind(message)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn get_notifications(
        &self,
        user_id: Uuid,
        feed: NotificationFeed,
    ) -> RepoResult<Vec<Notification>> {
        let filter = match feed {
            NotificationFeed::All => "",
            NotificationFeed::Unread => " AND seen = FALSE",
        };
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE user_id = $1{filter} ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn mark_notification_read(&self, id: Uuid) -> RepoResult<bool> {
        self.execute_affects_row("UPDATE notifications SET seen = TRUE WHERE id = $1", id)
            .await
    }

    async fn delete_notification(&self, id: Uuid) -> RepoResult<bool> {
        self.execute_affects_row("DELETE FROM notifications WHERE id = $1", id)
            .await
    }

    async fn register_token(
        &self,
        user_id: Uuid,
        token: &str,
        platform: Platform,
    ) -> RepoResult<Option<NotificationToken>> {
        // The conflict update only fires for the current holder; otherwise no row comes back.
        let sql = format!(
            "INSERT INTO notification_tokens (user_id, token, platform) VALUES ($1, $2, $3) \
             ON CONFLICT (token) DO UPDATE \
                SET platform = EXCLUDED.platform, updated_at = NOW() \
                WHERE notification_tokens.user_id = EXCLUDED.user_id \
             RETURNING {TOKEN_COLUMNS}"
        );
        sqlx::query_as::<_, NotificationToken>(&sql)
            .bind(user_id)
            .bind(token)
            .bind(platform.as_str())
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_tokens_by_user(&self, user_id: Uuid) -> RepoResult<Vec<NotificationToken>> {
        let sql = format!(
            "SELECT {TOKEN_COLUMNS} FROM notification_tokens WHERE user_id = $1 ORDER BY created_at"
        );
        sqlx::query_as::<_, NotificationToken>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn delete_token(&self, id: Uuid) -> RepoResult<bool> {
        self.execute_affects_row("DELETE FROM notification_tokens WHERE id = $1", id)
            .await
    }
}

#[async_trait]
impl OwnershipStore for PostgresRepository {
    async fn is_owner(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        subject_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(kind.ownership_query())
            .bind(resource_id)
            .bind(subject_id)
            .fetch_one(&self.pool)
            .await
    }
}
