#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use car_market::{
    AppConfig, AppState,
    access::{
        AccessPipeline, OwnershipStore, OwnershipVerifier, PathClassifier, PolicyEnforcer,
        PolicyTable, ResourceKind,
    },
    auth::{Claims, JwtIdentityResolver},
    create_router,
    models::{
        Car, CarQuery, CarSearch, Comment, CreateCarRequest, Image, Message, Notification,
        NotificationFeed, NotificationToken, Platform, PriceOrder, SavedCar, UpdateCarRequest,
    },
    notify::{DispatchReport, MockPushSender, PushDispatcher},
    repository::{RepoResult, Repository, RepositoryState},
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const POLICY_CSV: &str = include_str!("../../policy/policy.csv");

// --- In-memory persistence ---

#[derive(Default)]
struct Tables {
    cars: Vec<Car>,
    images: Vec<Image>,
    saved_cars: Vec<SavedCar>,
    comments: Vec<Comment>,
    messages: Vec<Message>,
    notifications: Vec<Notification>,
    tokens: Vec<NotificationToken>,
}

/// InMemoryRepository
///
/// Vec-backed `Repository` and `OwnershipStore` for router-level tests. Counts
/// ownership lookups and can be told to fail them.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    pub fail_ownership: AtomicBool,
    ownership_calls: AtomicUsize,
}

impl InMemoryRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ownership_calls(&self) -> usize {
        self.ownership_calls.load(Ordering::SeqCst)
    }

    pub fn car_count(&self) -> usize {
        self.tables.lock().unwrap().cars.len()
    }

    pub fn has_car(&self, id: Uuid) -> bool {
        self.tables.lock().unwrap().cars.iter().any(|c| c.id == id)
    }

    pub fn message_count(&self) -> usize {
        self.tables.lock().unwrap().messages.len()
    }

    pub fn token_owner(&self, token: &str) -> Option<Uuid> {
        let tables = self.tables.lock().unwrap();
        tables.tokens.iter().find(|t| t.token == token).map(|t| t.user_id)
    }

    /// Every table serialized, for asserting a denied mutation changed nothing.
    pub fn snapshot(&self) -> serde_json::Value {
        let tables = self.tables.lock().unwrap();
        serde_json::json!({
            "cars": tables.cars,
            "images": tables.images,
            "saved_cars": tables.saved_cars,
            "comments": tables.comments,
            "messages": tables.messages,
            "tokens": tables.tokens,
        })
    }

    pub fn seed_saved_car(&self, user_id: Uuid, car_id: Uuid) -> SavedCar {
        let now = Utc::now();
        let saved = SavedCar {
            id: Uuid::new_v4(),
            user_id,
            car_id,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().unwrap().saved_cars.push(saved.clone());
        saved
    }

    pub fn seed_car(&self, owner_id: Uuid, make: &str, price: f64) -> Car {
        let now = Utc::now();
        let car = Car {
            id: Uuid::new_v4(),
            car_type: "sedan".to_string(),
            make: make.to_string(),
            model: "Model".to_string(),
            price,
            available: true,
            owner_id,
            location: "Limerick".to_string(),
            created_at: now,
            updated_at: now,
            ..Default::default()
        };
        self.tables.lock().unwrap().cars.push(car.clone());
        car
    }

    pub fn seed_image(&self, car_id: Uuid) -> Image {
        let image = Image {
            id: Uuid::new_v4(),
            car_id,
            filename: "front.jpg".to_string(),
            uploaded_at: Utc::now(),
        };
        self.tables.lock().unwrap().images.push(image.clone());
        image
    }

    pub fn seed_comment(&self, user_id: Uuid, car_id: Uuid) -> Comment {
        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4(),
            user_id,
            car_id,
            content: "Is it still available?".to_string(),
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().unwrap().comments.push(comment.clone());
        comment
    }

    pub fn seed_message(&self, sender_id: Uuid, recipient_id: Uuid, content: &str) -> Message {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id,
            recipient_id,
            content: content.to_string(),
            read: false,
            created_at: Utc::now(),
        };
        self.tables.lock().unwrap().messages.push(message.clone());
        message
    }

    pub fn seed_token(&self, user_id: Uuid, token: &str) -> NotificationToken {
        let now = Utc::now();
        let registered = NotificationToken {
            id: Uuid::new_v4(),
            user_id,
            token: token.to_string(),
            platform: Platform::Android.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().unwrap().tokens.push(registered.clone());
        registered
    }

    fn with_images(tables: &Tables, mut car: Car) -> Car {
        car.images = tables
            .images
            .iter()
            .filter(|i| i.car_id == car.id)
            .cloned()
            .collect();
        car
    }
}

fn page<T>(items: Vec<T>, offset: i64, limit: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect()
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_car(&self, owner_id: Uuid, req: &CreateCarRequest) -> RepoResult<Car> {
        let now = Utc::now();
        let car = Car {
            id: Uuid::new_v4(),
            car_type: req.car_type.clone(),
            make: req.make.clone(),
            model: req.model.clone(),
            year: req.year,
            color: req.color.clone(),
            mileage: req.mileage,
            price: req.price,
            description: req.description.clone(),
            available: true,
            owner_id,
            location: req.location.clone(),
            reviews_count: 0,
            created_at: now,
            updated_at: now,
            images: Vec::new(),
        };
        self.tables.lock().unwrap().cars.push(car.clone());
        Ok(car)
    }

    async fn get_car(&self, id: Uuid) -> RepoResult<Option<Car>> {
        let tables = self.tables.lock().unwrap();
        let car = tables.cars.iter().find(|c| c.id == id).cloned();
        Ok(car.map(|c| Self::with_images(&tables, c)))
    }

    async fn car_exists(&self, id: Uuid) -> RepoResult<bool> {
        Ok(self.has_car(id))
    }

    async fn list_cars(&self, query: &CarQuery) -> RepoResult<Vec<Car>> {
        let tables = self.tables.lock().unwrap();
        let mut cars: Vec<Car> = tables
            .cars
            .iter()
            .filter(|c| query.car_type.as_ref().is_none_or(|t| &c.car_type == t))
            .filter(|c| query.location.as_ref().is_none_or(|l| &c.location == l))
            .filter(|c| query.min_price.is_none_or(|p| c.price >= p))
            .filter(|c| query.max_price.is_none_or(|p| c.price <= p))
            .filter(|c| query.owner_id.is_none_or(|o| c.owner_id == o))
            .cloned()
            .collect();
        match query.price_order {
            Some(PriceOrder::Asc) => cars.sort_by(|a, b| a.price.total_cmp(&b.price)),
            Some(PriceOrder::Desc) => cars.sort_by(|a, b| b.price.total_cmp(&a.price)),
            None => {}
        }
        let cars = page(cars, query.offset, query.limit);
        Ok(cars
            .into_iter()
            .map(|c| Self::with_images(&tables, c))
            .collect())
    }

    async fn search_cars(&self, search: &CarSearch) -> RepoResult<Vec<Car>> {
        let needle = search.query.to_lowercase();
        let tables = self.tables.lock().unwrap();
        let cars: Vec<Car> = tables
            .cars
            .iter()
            .filter(|c| {
                [&c.make, &c.model, &c.car_type, &c.color, &c.location, &c.description]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        Ok(page(cars, search.offset, search.limit))
    }

    async fn update_car(&self, id: Uuid, req: &UpdateCarRequest) -> RepoResult<Option<Car>> {
        let mut tables = self.tables.lock().unwrap();
        let Some(car) = tables.cars.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if let Some(make) = &req.make {
            car.make = make.clone();
        }
        if let Some(model) = &req.model {
            car.model = model.clone();
        }
        if let Some(price) = req.price {
            car.price = price;
        }
        if let Some(available) = req.available {
            car.available = available;
        }
        if let Some(location) = &req.location {
            car.location = location.clone();
        }
        car.updated_at = Utc::now();
        let car = car.clone();
        Ok(Some(Self::with_images(&tables, car)))
    }

    async fn delete_car(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.cars.len();
        tables.cars.retain(|c| c.id != id);
        Ok(tables.cars.len() < before)
    }

    async fn increment_review_count(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        match tables.cars.iter_mut().find(|c| c.id == id) {
            Some(car) => {
                car.reviews_count += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_image(&self, car_id: Uuid, filename: &str) -> RepoResult<Image> {
        let image = Image {
            id: Uuid::new_v4(),
            car_id,
            filename: filename.to_string(),
            uploaded_at: Utc::now(),
        };
        self.tables.lock().unwrap().images.push(image.clone());
        Ok(image)
    }

    async fn get_images_by_car(&self, car_id: Uuid) -> RepoResult<Vec<Image>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .images
            .iter()
            .filter(|i| i.car_id == car_id)
            .cloned()
            .collect())
    }

    async fn get_image(&self, id: Uuid) -> RepoResult<Option<Image>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.images.iter().find(|i| i.id == id).cloned())
    }

    async fn delete_image(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.images.len();
        tables.images.retain(|i| i.id != id);
        Ok(tables.images.len() < before)
    }

    async fn delete_images_by_car(&self, car_id: Uuid) -> RepoResult<u64> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.images.len();
        tables.images.retain(|i| i.car_id != car_id);
        Ok((before - tables.images.len()) as u64)
    }

    async fn save_car(&self, user_id: Uuid, car_id: Uuid) -> RepoResult<SavedCar> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(existing) = tables
            .saved_cars
            .iter()
            .find(|s| s.user_id == user_id && s.car_id == car_id)
        {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let saved = SavedCar {
            id: Uuid::new_v4(),
            user_id,
            car_id,
            created_at: now,
            updated_at: now,
        };
        tables.saved_cars.push(saved.clone());
        Ok(saved)
    }

    async fn get_saved_cars(&self, user_id: Uuid) -> RepoResult<Vec<SavedCar>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .saved_cars
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_saved_car(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.saved_cars.len();
        tables.saved_cars.retain(|s| s.id != id);
        Ok(tables.saved_cars.len() < before)
    }

    async fn delete_saved_cars_by_car(&self, car_id: Uuid) -> RepoResult<u64> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.saved_cars.len();
        tables.saved_cars.retain(|s| s.car_id != car_id);
        Ok((before - tables.saved_cars.len()) as u64)
    }

    async fn create_comment(
        &self,
        user_id: Uuid,
        car_id: Uuid,
        content: &str,
    ) -> RepoResult<Comment> {
        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4(),
            user_id,
            car_id,
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().unwrap().comments.push(comment.clone());
        Ok(comment)
    }

    async fn get_comments_by_car(&self, car_id: Uuid) -> RepoResult<Vec<Comment>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .comments
            .iter()
            .filter(|c| c.car_id == car_id)
            .cloned()
            .collect())
    }

    async fn update_comment(&self, id: Uuid, content: &str) -> RepoResult<Option<Comment>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables.comments.iter_mut().find(|c| c.id == id).map(|c| {
            c.content = content.to_string();
            c.updated_at = Utc::now();
            c.clone()
        }))
    }

    async fn delete_comment(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.comments.len();
        tables.comments.retain(|c| c.id != id);
        Ok(tables.comments.len() < before)
    }

    async fn delete_comments_by_car(&self, car_id: Uuid) -> RepoResult<u64> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.comments.len();
        tables.comments.retain(|c| c.car_id != car_id);
        Ok((before - tables.comments.len()) as u64)
    }

    async fn create_message(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        content: &str,
    ) -> RepoResult<Message> {
        Ok(self.seed_message(sender_id, recipient_id, content))
    }

    async fn get_messages_for_user(&self, user_id: Uuid) -> RepoResult<Vec<Message>> {
        let tables = self.tables.lock().unwrap();
        // Newest first: seeded in chronological order.
        Ok(tables
            .messages
            .iter()
            .rev()
            .filter(|m| m.sender_id == user_id || m.recipient_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_conversation(&self, user_id: Uuid, other_id: Uuid) -> RepoResult<Vec<Message>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == user_id && m.recipient_id == other_id)
                    || (m.sender_id == other_id && m.recipient_id == user_id)
            })
            .cloned()
            .collect())
    }

    async fn mark_message_read(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        match tables.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_message(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.messages.len();
        tables.messages.retain(|m| m.id != id);
        Ok(tables.messages.len() < before)
    }

    async fn create_notification(
        &self,
        user_id: Uuid,
        notification_type: &str,
        message: &str,
    ) -> RepoResult<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            notification_type: notification_type.to_string(),
            message: message.to_string(),
            seen: false,
            created_at: Utc::now(),
        };
        self.tables
            .lock()
            .unwrap()
            .notifications
            .push(notification.clone());
        Ok(notification)
    }

    async fn get_notifications(
        &self,
        user_id: Uuid,
        feed: NotificationFeed,
    ) -> RepoResult<Vec<Notification>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .filter(|n| feed == NotificationFeed::All || !n.seen)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        match tables.notifications.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.seen = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_notification(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.notifications.len();
        tables.notifications.retain(|n| n.id != id);
        Ok(tables.notifications.len() < before)
    }

    async fn register_token(
        &self,
        user_id: Uuid,
        token: &str,
        platform: Platform,
    ) -> RepoResult<Option<NotificationToken>> {
        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();
        if let Some(existing) = tables.tokens.iter_mut().find(|t| t.token == token) {
            if existing.user_id != user_id {
                return Ok(None);
            }
            existing.platform = platform.to_string();
            existing.updated_at = now;
            return Ok(Some(existing.clone()));
        }
        let registered = NotificationToken {
            id: Uuid::new_v4(),
            user_id,
            token: token.to_string(),
            platform: platform.to_string(),
            created_at: now,
            updated_at: now,
        };
        tables.tokens.push(registered.clone());
        Ok(Some(registered))
    }

    async fn get_tokens_by_user(&self, user_id: Uuid) -> RepoResult<Vec<NotificationToken>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_token(&self, id: Uuid) -> RepoResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.tokens.len();
        tables.tokens.retain(|t| t.id != id);
        Ok(tables.tokens.len() < before)
    }
}

#[async_trait]
impl OwnershipStore for InMemoryRepository {
    async fn is_owner(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        subject_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        self.ownership_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_ownership.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let tables = self.tables.lock().unwrap();
        let owned = match kind {
            ResourceKind::Car => tables
                .cars
                .iter()
                .any(|c| c.id == resource_id && c.owner_id == subject_id),
            ResourceKind::SavedCar => tables
                .saved_cars
                .iter()
                .any(|s| s.id == resource_id && s.user_id == subject_id),
            ResourceKind::Comment => tables
                .comments
                .iter()
                .any(|c| c.id == resource_id && c.user_id == subject_id),
            ResourceKind::Message => tables
                .messages
                .iter()
                .any(|m| m.id == resource_id && m.sender_id == subject_id),
            ResourceKind::NotificationToken => tables
                .tokens
                .iter()
                .any(|t| t.id == resource_id && t.user_id == subject_id),
            ResourceKind::Image => tables.images.iter().any(|i| {
                i.id == resource_id
                    && tables
                        .cars
                        .iter()
                        .any(|c| c.id == i.car_id && c.owner_id == subject_id)
            }),
        };
        Ok(owned)
    }
}

// --- Credentials ---

/// Signs a token with the local development key.
pub fn token_for(user_id: Uuid, role: &str) -> String {
    sign(user_id, role, 3600, &AppConfig::default().token_key)
}

pub fn sign(user_id: Uuid, role: &str, ttl_secs: i64, secret: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        role: role.to_string(),
        exp: (now + ttl_secs) as usize,
        iat: Some(now as usize),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

// --- App assembly ---

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub push: Arc<MockPushSender>,
    pub reports: mpsc::UnboundedReceiver<DispatchReport>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_push(Arc::new(MockPushSender::new())).await
    }

    pub async fn with_push(push: Arc<MockPushSender>) -> Self {
        let repo = InMemoryRepository::new();
        let (tx, reports) = mpsc::unbounded_channel();
        let state = test_state(repo.clone(), push.clone(), Some(tx)).await;
        Self {
            router: create_router(state),
            repo,
            push,
            reports,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub async fn test_state(
    repo: Arc<InMemoryRepository>,
    push: Arc<MockPushSender>,
    reports: Option<mpsc::UnboundedSender<DispatchReport>>,
) -> AppState {
    let config = AppConfig::default();

    let classifier = PathClassifier::with_defaults().unwrap();
    let table = PolicyTable::parse(POLICY_CSV).unwrap();
    let enforcer = PolicyEnforcer::new(&table).await.unwrap();
    let resolver = Arc::new(JwtIdentityResolver::new(&config.token_key));
    let pipeline = Arc::new(AccessPipeline::new(
        Arc::new(classifier),
        resolver,
        Arc::new(enforcer),
    ));

    let mut dispatcher = PushDispatcher::new(push, config.push.max_in_flight);
    if let Some(tx) = reports {
        dispatcher = dispatcher.with_reports(tx);
    }

    AppState {
        repo: repo.clone() as RepositoryState,
        ownership: OwnershipVerifier::new(repo),
        push: dispatcher,
        pipeline,
        config,
    }
}

// --- Request helpers ---

pub fn request(method: &str, uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
