use std::path::PathBuf;

use reqwest::multipart::{Form, Part};
use reqwest::Method;
use shared::{Book, MessageResponse};
use tracing::info;

use super::{ApiClient, ApiError, ApiResult, Auth};

/// Fields of the admin create/update form, sent as multipart.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BookForm {
    pub title: String,
    pub author: String,
    pub description: String,
    pub price: f64,
    pub count_in_stock: u32,
    pub category: String,
    /// Only attached when a new image file is picked.
    pub image: Option<PathBuf>,
}

impl BookForm {
    async fn into_multipart(self) -> ApiResult<Form> {
        let mut form = Form::new()
            .text("title", self.title)
            .text("author", self.author)
            .text("description", self.description)
            .text("price", self.price.to_string())
            .text("countInStock", self.count_in_stock.to_string())
            .text("category", self.category);
        if let Some(path) = self.image {
            let bytes = tokio::fs::read(&path).await.map_err(|error| {
                ApiError::Request(format!("cannot read image {}: {error}", path.display()))
            })?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_owned());
            form = form.part("image", Part::bytes(bytes).file_name(file_name));
        }
        Ok(form)
    }
}

pub async fn get_books(api: &ApiClient) -> ApiResult<Vec<Book>> {
    let books: Vec<Book> = api.get("/books").await?;
    info!(count = books.len(), "Api get books");
    Ok(books)
}

pub async fn get_book_by_id(api: &ApiClient, id: &str) -> ApiResult<Book> {
    info!(book_id = %id, "Api get book by id");
    api.get(&format!("/books/{id}")).await
}

pub async fn get_new_releases(api: &ApiClient) -> ApiResult<Vec<Book>> {
    api.get("/books/new-releases").await
}

pub async fn get_best_sellers(api: &ApiClient) -> ApiResult<Vec<Book>> {
    api.get("/books/best-sellers").await
}

pub async fn create_book(api: &ApiClient, form: BookForm) -> ApiResult<Book> {
    let request = api
        .request(Method::POST, "/books", Auth::Stored)?
        .multipart(form.into_multipart().await?);
    let book: Book = api.execute(request).await?;
    info!(book_id = %book.id, title = %book.title, "Api book created");
    Ok(book)
}

pub async fn update_book(api: &ApiClient, id: &str, form: BookForm) -> ApiResult<Book> {
    let request = api
        .request(Method::PUT, &format!("/books/{id}"), Auth::Stored)?
        .multipart(form.into_multipart().await?);
    let book: Book = api.execute(request).await?;
    info!(book_id = %book.id, "Api book updated");
    Ok(book)
}

pub async fn delete_book(api: &ApiClient, id: &str) -> ApiResult<MessageResponse> {
    let response = api.delete(&format!("/books/{id}")).await?;
    info!(book_id = %id, "Api book deleted");
    Ok(response)
}
