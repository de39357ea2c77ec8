use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use shared::{Book, OrderItem};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::store::{keys, Storage, StorageError, StorageExt};

/// One product line. `count_in_stock` is the stock seen when the line was
/// first added and is never refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub price: f64,
    #[serde(default)]
    pub image: Option<String>,
    pub count_in_stock: u32,
    pub quantity: u32,
}

impl CartItem {
    pub fn from_book(book: &Book, quantity: u32) -> Self {
        Self {
            id: book.id.clone(),
            title: book.title.clone(),
            price: book.price,
            image: book.image.clone(),
            count_in_stock: book.count_in_stock,
            quantity,
        }
    }

    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

impl From<&CartItem> for OrderItem {
    fn from(item: &CartItem) -> Self {
        OrderItem {
            book: item.id.clone(),
            title: item.title.clone(),
            quantity: item.quantity,
            image: item.image.clone(),
            price: item.price,
        }
    }
}

/// Owns the cart lines, in insertion order, one line per product.
///
/// Each mutation is computed on a copy, written to storage, and only then
/// becomes the in-memory cart.
pub struct CartManager {
    items: Mutex<Vec<CartItem>>,
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn Notifier>,
}

impl CartManager {
    pub fn load(storage: Arc<dyn Storage>, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let items = match read_items(storage.as_ref(), keys::CART) {
            Ok(Some(items)) => items,
            Ok(None) => migrate_legacy_items(storage.as_ref())?,
            Err(error) if error.is_corrupt() => {
                warn!(?error, "Failed to parse cart data, starting with an empty cart");
                Vec::new()
            }
            Err(error) => return Err(error.into()),
        };
        debug!(lines = items.len(), "Cart restored from storage");
        Ok(Self {
            items: Mutex::new(items),
            storage,
            notifier,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CartItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self, current: &mut Vec<CartItem>, updated: Vec<CartItem>) -> Result<()> {
        self.storage.set_json(keys::CART, &updated)?;
        *current = updated;
        Ok(())
    }

    fn reject_stock(&self, id: &str, available: u32) -> Error {
        let error = Error::StockExceeded {
            id: id.to_owned(),
            available,
        };
        warn!(book_id = %id, available, "Cart change rejected, not enough stock");
        self.notifier.warning(&error.to_string());
        error
    }

    pub fn items(&self) -> Vec<CartItem> {
        self.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<CartItem> {
        self.lock().iter().find(|item| item.id == id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn count(&self) -> u32 {
        self.lock().iter().map(|item| item.quantity).sum()
    }

    pub fn total(&self) -> f64 {
        self.lock().iter().map(CartItem::line_total).sum()
    }

    /// Adds `quantity` units of `book`, merging with an existing line.
    /// Returns the resulting line quantity.
    pub fn add_to_cart(&self, book: &Book, quantity: u32) -> Result<u32> {
        let mut items = self.lock();
        if quantity == 0 {
            return Ok(items
                .iter()
                .find(|item| item.id == book.id)
                .map_or(0, |item| item.quantity));
        }
        let mut updated = items.clone();
        let new_quantity = match updated.iter_mut().find(|item| item.id == book.id) {
            Some(existing) => {
                let wanted = existing.quantity.saturating_add(quantity);
                if wanted > existing.count_in_stock {
                    return Err(self.reject_stock(&book.id, existing.count_in_stock));
                }
                existing.quantity = wanted;
                wanted
            }
            None => {
                if quantity > book.count_in_stock {
                    return Err(self.reject_stock(&book.id, book.count_in_stock));
                }
                updated.push(CartItem::from_book(book, quantity));
                quantity
            }
        };
        let merged = updated.len() == items.len();
        self.commit(&mut items, updated)?;
        drop(items);
        info!(book_id = %book.id, quantity = new_quantity, "Cart line updated");
        if merged {
            self.notifier
                .success(&format!("Quantity updated ({new_quantity})"));
        } else {
            self.notifier.success("Item added to cart");
        }
        Ok(new_quantity)
    }

    /// Returns whether a line was removed.
    pub fn remove_from_cart(&self, id: &str) -> Result<bool> {
        let mut items = self.lock();
        if !items.iter().any(|item| item.id == id) {
            debug!(book_id = %id, "Nothing to remove from cart");
            return Ok(false);
        }
        let updated = items.iter().filter(|item| item.id != id).cloned().collect();
        self.commit(&mut items, updated)?;
        drop(items);
        info!(book_id = %id, "Cart line removed");
        self.notifier.success("Item removed from cart");
        Ok(true)
    }

    /// Quantities below one and unknown ids leave the cart untouched.
    pub fn update_quantity(&self, id: &str, new_quantity: u32) -> Result<()> {
        if new_quantity < 1 {
            return Ok(());
        }
        let mut items = self.lock();
        let Some(position) = items.iter().position(|item| item.id == id) else {
            return Ok(());
        };
        let mut updated = items.clone();
        let Some(line) = updated.get_mut(position) else {
            return Ok(());
        };
        if new_quantity > line.count_in_stock {
            return Err(self.reject_stock(id, line.count_in_stock));
        }
        line.quantity = new_quantity;
        self.commit(&mut items, updated)?;
        drop(items);
        info!(book_id = %id, quantity = new_quantity, "Cart quantity set");
        self.notifier
            .success(&format!("Quantity updated to {new_quantity}"));
        Ok(())
    }

    pub fn clear_cart(&self) -> Result<()> {
        let mut items = self.lock();
        self.commit(&mut items, Vec::new())?;
        drop(items);
        info!("Cart cleared");
        self.notifier.success("Cart cleared");
        Ok(())
    }
}

fn read_items(storage: &dyn Storage, key: &str) -> Result<Option<Vec<CartItem>>, StorageError> {
    storage.get_json::<Vec<CartItem>>(key)
}

/// Folds the old `cartItems` mirror into `cart` so only one copy remains.
fn migrate_legacy_items(storage: &dyn Storage) -> Result<Vec<CartItem>> {
    let items = match read_items(storage, keys::LEGACY_CART_ITEMS) {
        Ok(Some(items)) => items,
        Ok(None) => return Ok(Vec::new()),
        Err(error) => {
            warn!(?error, "Dropping unreadable legacy cart");
            storage.remove(keys::LEGACY_CART_ITEMS)?;
            return Ok(Vec::new());
        }
    };
    let items: Vec<CartItem> = items
        .into_iter()
        .filter(|item| item.quantity >= 1 && item.count_in_stock >= 1)
        .map(|mut item| {
            item.quantity = item.quantity.min(item.count_in_stock);
            item
        })
        .collect();
    let serialized = serde_json::to_string(&items).map_err(|source| StorageError::Malformed {
        key: keys::CART.to_owned(),
        source,
    })?;
    storage.set(keys::CART, serialized)?;
    storage.remove(keys::LEGACY_CART_ITEMS)?;
    info!(lines = items.len(), "Migrated legacy cart items");
    Ok(items)
}
