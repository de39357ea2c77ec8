use chrono::{DateTime, Utc};
use shared::{Book, Order, OrderOwner, UserProfile};
use storefront::cart::CartItem;
use storefront::checkout::{CheckoutState, OrderSummary, TestCard};
use storefront::notify::{NotificationLevel, Notifier};
use strum::IntoEnumIterator;
use url::Url;

/// Prints notifications to stderr so stdout stays parseable.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) {
        let icon = match level {
            NotificationLevel::Success => "✔",
            NotificationLevel::Info => "ℹ",
            NotificationLevel::Warning => "⚠",
            NotificationLevel::Error => "✘",
        };
        eprintln!("{icon} {message}");
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_owned())
}

pub fn print_user(user: &UserProfile) {
    println!(
        "{id}  {name} <{email}>{admin}  joined {joined}",
        id = user.id,
        name = user.name,
        email = user.email,
        admin = if user.is_admin { " [admin]" } else { "" },
        joined = format_date(user.join_date),
    );
}

pub fn print_books(books: &[Book], asset_url: &Url) {
    if books.is_empty() {
        println!("No books found");
    }
    for book in books {
        println!(
            "{id}  {title} by {author}  ${price:.2}  ({stock} in stock)  {image}",
            id = book.id,
            title = book.title,
            author = book.author,
            price = book.price,
            stock = book.count_in_stock,
            image = book.image_url(asset_url),
        );
    }
}

pub fn print_book(book: &Book, asset_url: &Url) {
    println!("{} ({})", book.title, book.id);
    println!("  author:   {}", book.author);
    println!("  category: {}", book.category);
    println!("  price:    ${:.2}", book.price);
    println!(
        "  stock:    {}",
        if book.in_stock() {
            book.count_in_stock.to_string()
        } else {
            "out of stock".to_owned()
        }
    );
    println!("  image:    {}", book.image_url(asset_url));
    println!("  added:    {}", format_date(book.created_at));
    if !book.description.is_empty() {
        println!();
        println!("{}", book.description);
    }
}

fn print_summary(summary: &OrderSummary) {
    println!("  items:    ${:.2}", summary.items_price);
    println!("  shipping: ${:.2}", summary.shipping_price);
    println!("  tax:      ${:.2}", summary.tax_price);
    println!("  total:    ${:.2}", summary.total_price);
}

pub fn print_cart(items: &[CartItem], summary: &OrderSummary) {
    if items.is_empty() {
        println!("Your cart is empty");
        return;
    }
    for item in items {
        println!(
            "{id}  {title}  {quantity} x ${price:.2} = ${total:.2}  (max {stock})",
            id = item.id,
            title = item.title,
            quantity = item.quantity,
            price = item.price,
            total = item.line_total(),
            stock = item.count_in_stock,
        );
    }
    let count: u32 = items.iter().map(|item| item.quantity).sum();
    println!("{count} item(s)");
    print_summary(summary);
}

pub fn print_checkout(state: &CheckoutState, items: &[CartItem], summary: &OrderSummary) {
    println!("Step: {}", state.step);
    match &state.shipping_address {
        Some(address) => println!(
            "Ship to: {}, {}, {}, {}",
            address.address, address.city, address.postal_code, address.country
        ),
        None => println!("Ship to: (not set)"),
    }
    println!("Payment: {}", state.payment_method);
    print_cart(items, summary);
}

fn owner_email(order: &Order) -> Option<&str> {
    match order.user.as_ref()? {
        OrderOwner::Populated(customer) => customer.email.as_deref(),
        OrderOwner::Id(_) => None,
    }
}

pub fn print_order_line(order: &Order) {
    println!(
        "{id}  {date}  ${total:.2}  {paid}  {delivered}",
        id = order.id,
        date = format_date(order.created_at),
        total = order.total_price,
        paid = if order.is_paid { "paid" } else { "unpaid" },
        delivered = if order.is_delivered {
            "delivered"
        } else {
            "pending delivery"
        },
    );
}

pub fn print_order(order: &Order) {
    println!("Order #{}", order.id);
    if let Some(email) = owner_email(order) {
        println!("  confirmation sent to {email}");
    }
    for item in &order.order_items {
        println!(
            "  {title}  {quantity} x ${price:.2}",
            title = item.title,
            quantity = item.quantity,
            price = item.price,
        );
    }
    print_summary(&OrderSummary {
        items_price: order.items_price,
        shipping_price: order.shipping_price,
        tax_price: order.tax_price,
        total_price: order.total_price,
    });
    if let Some(address) = &order.shipping_address {
        println!(
            "  ship to:  {}, {}, {}, {}",
            address.address, address.city, address.postal_code, address.country
        );
    }
    println!(
        "  status:   {}, paid at {}",
        if order.is_paid { "paid" } else { "unpaid" },
        format_date(order.paid_at)
    );
}

pub fn print_test_cards() {
    for card in TestCard::iter() {
        let details = card.details();
        println!(
            "{card:<10} {number}  exp {expiry}  cvc {cvc}",
            number = details.number,
            expiry = details.expiry,
            cvc = details.cvc,
        );
    }
}
