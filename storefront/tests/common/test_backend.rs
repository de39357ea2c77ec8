#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::{
    AuthResponse, Book, MessageResponse, NewOrderRequest, Order, OrderCustomer, OrderOwner,
    PaymentResult, UpdateUserRequest, UserProfile,
};
use url::Url;
use uuid::Uuid;

type Reply<T> = Result<Json<T>, Response>;

/// Book id answered with a 500 and a non-JSON body.
pub const BROKEN_BOOK_ID: &str = "broken";

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

/// Multipart form as the admin book endpoints received it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BookUpload {
    pub book_id: Option<String>,
    pub fields: HashMap<String, String>,
    pub image_name: Option<String>,
    pub image_len: usize,
}

/// In-process stand-in for the bookstore REST API.
#[derive(Default)]
pub struct TestBackend {
    accounts: Mutex<HashMap<String, (String, UserProfile)>>,
    tokens: Mutex<HashMap<String, String>>,
    books: Mutex<Vec<Book>>,
    orders: Mutex<Vec<(String, Order)>>,
    requests: Mutex<Vec<RecordedRequest>>,
    uploads: Mutex<Vec<BookUpload>>,
}

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct Registration {
    name: String,
    email: String,
    password: String,
}

fn failure(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

impl TestBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_account(&self, password: &str, user: UserProfile) {
        self.accounts
            .lock()
            .unwrap()
            .insert(user.email.clone(), (password.to_owned(), user));
    }

    pub fn add_book(&self, book: Book) {
        self.books.lock().unwrap().push(book);
    }

    pub fn issue_token(&self, token: &str, user_id: &str) {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.to_owned(), user_id.to_owned());
    }

    pub fn revoke_all_tokens(&self) {
        self.tokens.lock().unwrap().clear();
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn books(&self) -> Vec<Book> {
        self.books.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<BookUpload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn accounts(&self) -> Vec<UserProfile> {
        self.accounts
            .lock()
            .unwrap()
            .values()
            .map(|(_, user)| user.clone())
            .collect()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .map(|(_, order)| order.clone())
            .collect()
    }

    fn record(&self, method: &str, path: &str, headers: &HeaderMap) {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.to_owned(),
            path: path.to_owned(),
            authorization: bearer(headers),
        });
    }

    fn user_for(&self, headers: &HeaderMap) -> Result<UserProfile, Response> {
        let not_authorized = || {
            failure(
                StatusCode::UNAUTHORIZED,
                json!({"message": "Not authorized, token failed"}),
            )
        };
        let token = bearer(headers)
            .and_then(|value| value.strip_prefix("Bearer ").map(str::to_owned))
            .ok_or_else(not_authorized)?;
        let user_id = self
            .tokens
            .lock()
            .unwrap()
            .get(&token)
            .cloned()
            .ok_or_else(not_authorized)?;
        self.accounts
            .lock()
            .unwrap()
            .values()
            .map(|(_, user)| user.clone())
            .find(|user| user.id == user_id)
            .ok_or_else(not_authorized)
    }

    fn admin_for(&self, headers: &HeaderMap) -> Result<UserProfile, Response> {
        let user = self.user_for(headers)?;
        if user.is_admin {
            Ok(user)
        } else {
            Err(failure(
                StatusCode::FORBIDDEN,
                json!({"error": "Not authorized as an admin"}),
            ))
        }
    }

    fn sign_in(&self, user: UserProfile) -> AuthResponse {
        let token = format!("token-{}", Uuid::new_v4().simple());
        self.issue_token(&token, &user.id);
        AuthResponse { user, token }
    }
}

/// Binds the fake API on an ephemeral port and returns its base URL.
pub async fn spawn(backend: Arc<TestBackend>) -> anyhow::Result<Url> {
    let api = Router::new()
        .route("/users/login", post(login))
        .route("/users/register", post(register))
        .route("/users/logout", post(logout))
        .route("/users/profile", get(profile))
        .route("/users", get(list_users))
        .route("/users/{id}", put(update_user).delete(delete_user))
        .route("/books", get(list_books).post(create_book))
        .route("/books/new-releases", get(list_books))
        .route("/books/best-sellers", get(list_books))
        .route(
            "/books/{id}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .route("/orders", post(create_order))
        .route("/orders/myorders", get(my_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/pay", put(pay_order))
        .with_state(backend);
    let app = Router::new().nest("/api", api);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(Url::parse(&format!("http://{address}/api"))?)
}

async fn login(
    State(backend): State<Arc<TestBackend>>,
    headers: HeaderMap,
    Json(credentials): Json<Credentials>,
) -> Reply<AuthResponse> {
    backend.record("POST", "/users/login", &headers);
    let account = backend
        .accounts
        .lock()
        .unwrap()
        .get(&credentials.email)
        .cloned();
    match account {
        Some((password, user)) if password == credentials.password => {
            Ok(Json(backend.sign_in(user)))
        }
        _ => Err(failure(
            StatusCode::UNAUTHORIZED,
            json!({"message": "Invalid email or password"}),
        )),
    }
}

async fn register(
    State(backend): State<Arc<TestBackend>>,
    headers: HeaderMap,
    Json(registration): Json<Registration>,
) -> Reply<AuthResponse> {
    backend.record("POST", "/users/register", &headers);
    if backend
        .accounts
        .lock()
        .unwrap()
        .contains_key(&registration.email)
    {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            json!({"message": "User already exists"}),
        ));
    }
    let user = UserProfile {
        id: Uuid::new_v4().simple().to_string(),
        name: registration.name,
        email: registration.email,
        is_admin: false,
        join_date: None,
    };
    backend.add_account(&registration.password, user.clone());
    Ok(Json(backend.sign_in(user)))
}

async fn logout(State(backend): State<Arc<TestBackend>>, headers: HeaderMap) -> Reply<Value> {
    backend.record("POST", "/users/logout", &headers);
    if let Some(token) = bearer(&headers).and_then(|v| v.strip_prefix("Bearer ").map(str::to_owned))
    {
        backend.tokens.lock().unwrap().remove(&token);
    }
    Ok(Json(json!({"message": "Logged out successfully"})))
}

async fn profile(State(backend): State<Arc<TestBackend>>, headers: HeaderMap) -> Reply<UserProfile> {
    backend.record("GET", "/users/profile", &headers);
    backend.user_for(&headers).map(Json)
}

async fn list_users(
    State(backend): State<Arc<TestBackend>>,
    headers: HeaderMap,
) -> Reply<Vec<UserProfile>> {
    backend.record("GET", "/users", &headers);
    backend.admin_for(&headers)?;
    Ok(Json(backend.accounts()))
}

async fn update_user(
    State(backend): State<Arc<TestBackend>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> Reply<UserProfile> {
    backend.record("PUT", &format!("/users/{id}"), &headers);
    backend.admin_for(&headers)?;
    let mut accounts = backend.accounts.lock().unwrap();
    let email = accounts
        .iter()
        .find(|(_, (_, user))| user.id == id)
        .map(|(email, _)| email.clone())
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, json!({"message": "User not found"})))?;
    let Some((password, mut user)) = accounts.remove(&email) else {
        return Err(failure(StatusCode::NOT_FOUND, json!({"message": "User not found"})));
    };
    if let Some(name) = request.name {
        user.name = name;
    }
    if let Some(email) = request.email {
        user.email = email;
    }
    if let Some(is_admin) = request.is_admin {
        user.is_admin = is_admin;
    }
    accounts.insert(user.email.clone(), (password, user.clone()));
    Ok(Json(user))
}

async fn delete_user(
    State(backend): State<Arc<TestBackend>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Reply<MessageResponse> {
    backend.record("DELETE", &format!("/users/{id}"), &headers);
    backend.admin_for(&headers)?;
    let mut accounts = backend.accounts.lock().unwrap();
    let before = accounts.len();
    accounts.retain(|_, (_, user)| user.id != id);
    if accounts.len() == before {
        return Err(failure(StatusCode::NOT_FOUND, json!({"message": "User not found"})));
    }
    Ok(Json(MessageResponse {
        message: "User removed".to_owned(),
    }))
}

/// Drains a multipart body into text fields plus the optional image part.
async fn read_upload(
    book_id: Option<String>,
    mut multipart: Multipart,
) -> Result<BookUpload, Response> {
    let mut upload = BookUpload {
        book_id,
        ..BookUpload::default()
    };
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(IntoResponse::into_response)?
    {
        let name = field.name().unwrap_or_default().to_owned();
        if name == "image" {
            upload.image_name = field.file_name().map(str::to_owned);
            let bytes = field.bytes().await.map_err(IntoResponse::into_response)?;
            upload.image_len = bytes.len();
        } else {
            let value = field.text().await.map_err(IntoResponse::into_response)?;
            upload.fields.insert(name, value);
        }
    }
    Ok(upload)
}

fn apply_upload(book: &mut Book, upload: &BookUpload) {
    let text = |key: &str| upload.fields.get(key).cloned();
    if let Some(title) = text("title") {
        book.title = title;
    }
    if let Some(author) = text("author") {
        book.author = author;
    }
    if let Some(description) = text("description") {
        book.description = description;
    }
    if let Some(category) = text("category") {
        book.category = category;
    }
    if let Some(price) = text("price").and_then(|value| value.parse().ok()) {
        book.price = price;
    }
    if let Some(count) = text("countInStock").and_then(|value| value.parse().ok()) {
        book.count_in_stock = count;
    }
    if let Some(name) = &upload.image_name {
        book.image = Some(format!("/uploads/{name}"));
    }
}

async fn create_book(
    State(backend): State<Arc<TestBackend>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Reply<Book> {
    backend.record("POST", "/books", &headers);
    let admin = backend.admin_for(&headers)?;
    let upload = read_upload(None, multipart).await?;
    let mut book = Book {
        id: Uuid::new_v4().simple().to_string(),
        title: String::new(),
        author: String::new(),
        description: String::new(),
        price: 0.0,
        count_in_stock: 0,
        image: None,
        category: String::new(),
        user: Some(admin.id),
        created_at: Some(chrono::Utc::now()),
        updated_at: None,
    };
    apply_upload(&mut book, &upload);
    backend.uploads.lock().unwrap().push(upload);
    backend.add_book(book.clone());
    Ok(Json(book))
}

async fn update_book(
    State(backend): State<Arc<TestBackend>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Reply<Book> {
    backend.record("PUT", &format!("/books/{id}"), &headers);
    backend.admin_for(&headers)?;
    let upload = read_upload(Some(id.clone()), multipart).await?;
    let mut books = backend.books.lock().unwrap();
    let book = books
        .iter_mut()
        .find(|book| book.id == id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, json!({"message": "Book not found"})))?;
    apply_upload(book, &upload);
    book.updated_at = Some(chrono::Utc::now());
    let updated = book.clone();
    drop(books);
    backend.uploads.lock().unwrap().push(upload);
    Ok(Json(updated))
}

async fn delete_book(
    State(backend): State<Arc<TestBackend>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Reply<MessageResponse> {
    backend.record("DELETE", &format!("/books/{id}"), &headers);
    backend.admin_for(&headers)?;
    let mut books = backend.books.lock().unwrap();
    let before = books.len();
    books.retain(|book| book.id != id);
    if books.len() == before {
        return Err(failure(StatusCode::NOT_FOUND, json!({"message": "Book not found"})));
    }
    Ok(Json(MessageResponse {
        message: "Book removed".to_owned(),
    }))
}

async fn list_books(State(backend): State<Arc<TestBackend>>, headers: HeaderMap) -> Reply<Vec<Book>> {
    backend.record("GET", "/books", &headers);
    Ok(Json(backend.books.lock().unwrap().clone()))
}

async fn get_book(
    State(backend): State<Arc<TestBackend>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Reply<Book> {
    backend.record("GET", &format!("/books/{id}"), &headers);
    if id == BROKEN_BOOK_ID {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response());
    }
    backend
        .books
        .lock()
        .unwrap()
        .iter()
        .find(|book| book.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, json!({"message": "Book not found"})))
}

async fn create_order(
    State(backend): State<Arc<TestBackend>>,
    headers: HeaderMap,
    Json(request): Json<NewOrderRequest>,
) -> Reply<Order> {
    backend.record("POST", "/orders", &headers);
    let user = backend.user_for(&headers)?;
    if request.order_items.is_empty() {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            json!({"message": "No order items"}),
        ));
    }
    let order = Order {
        id: Uuid::new_v4().simple().to_string(),
        user: Some(OrderOwner::Populated(OrderCustomer {
            id: user.id.clone(),
            name: Some(user.name.clone()),
            email: Some(user.email.clone()),
        })),
        order_items: request.order_items,
        shipping_address: Some(request.shipping_address),
        payment_method: Some(request.payment_method.to_string()),
        items_price: request.items_price,
        shipping_price: request.shipping_price,
        tax_price: request.tax_price,
        total_price: request.total_price,
        is_paid: false,
        paid_at: None,
        is_delivered: false,
        delivered_at: None,
        created_at: Some(chrono::Utc::now()),
    };
    backend
        .orders
        .lock()
        .unwrap()
        .push((user.id, order.clone()));
    Ok(Json(order))
}

async fn my_orders(State(backend): State<Arc<TestBackend>>, headers: HeaderMap) -> Reply<Vec<Order>> {
    backend.record("GET", "/orders/myorders", &headers);
    let user = backend.user_for(&headers)?;
    let orders = backend
        .orders
        .lock()
        .unwrap()
        .iter()
        .filter(|(owner, _)| *owner == user.id)
        .map(|(_, order)| order.clone())
        .collect();
    Ok(Json(orders))
}

async fn get_order(
    State(backend): State<Arc<TestBackend>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Reply<Order> {
    backend.record("GET", &format!("/orders/{id}"), &headers);
    backend.user_for(&headers)?;
    backend
        .orders
        .lock()
        .unwrap()
        .iter()
        .map(|(_, order)| order)
        .find(|order| order.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, json!({"message": "Order not found"})))
}

async fn pay_order(
    State(backend): State<Arc<TestBackend>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(_payment): Json<PaymentResult>,
) -> Reply<Order> {
    backend.record("PUT", &format!("/orders/{id}/pay"), &headers);
    backend.user_for(&headers)?;
    let mut orders = backend.orders.lock().unwrap();
    let order = orders
        .iter_mut()
        .map(|(_, order)| order)
        .find(|order| order.id == id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, json!({"message": "Order not found"})))?;
    order.is_paid = true;
    order.paid_at = Some(chrono::Utc::now());
    Ok(Json(order.clone()))
}
