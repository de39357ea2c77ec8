use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use shared::{PaymentMethod, ShippingAddress, UpdateUserRequest};
use storefront::api::books_api::{self, BookForm};
use storefront::api::{orders_api, users_api};
use storefront::checkout::TestCard;
use storefront::store::FileStorage;
use storefront::{Config, StorefrontContext};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod output;

use output::TerminalNotifier;

const DEFAULT_STORE_DIR: &str = ".bookstore";
const DEFAULT_STORE_FILE: &str = "store.json";

#[derive(Parser, Debug)]
#[command(version, about = "Bookstore storefront client")]
struct Cli {
    #[clap(flatten)]
    config: Config,

    #[arg(long, env = "STOREFRONT_STORE_PATH", help = "Persisted session and cart file")]
    store_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and keep the session in the store
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "STOREFRONT_PASSWORD")]
        password: SecretString,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "STOREFRONT_PASSWORD")]
        password: SecretString,
    },
    /// Drop the local session, the cart is kept
    Logout,
    /// Refresh and show the signed-in profile
    Whoami,
    /// Keep the session revalidated until interrupted
    Watch,
    Books {
        #[command(subcommand)]
        command: BooksCommand,
    },
    Cart {
        #[command(subcommand)]
        command: CartCommand,
    },
    Checkout {
        #[command(subcommand)]
        command: CheckoutCommand,
    },
    Orders {
        #[command(subcommand)]
        command: OrdersCommand,
    },
    /// Admin user management
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
}

#[derive(Subcommand, Debug)]
enum BooksCommand {
    List,
    Show { id: String },
    NewReleases,
    BestSellers,
    Create(BookArgs),
    Update {
        id: String,
        #[clap(flatten)]
        book: BookArgs,
    },
    Delete { id: String },
}

#[derive(clap::Args, Debug)]
struct BookArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    author: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long)]
    price: f64,
    #[arg(long)]
    count_in_stock: u32,
    #[arg(long, default_value = "")]
    category: String,
    #[arg(long, help = "Image file to upload")]
    image: Option<PathBuf>,
}

impl From<BookArgs> for BookForm {
    fn from(args: BookArgs) -> Self {
        BookForm {
            title: args.title,
            author: args.author,
            description: args.description,
            price: args.price,
            count_in_stock: args.count_in_stock,
            category: args.category,
            image: args.image,
        }
    }
}

#[derive(Subcommand, Debug)]
enum CartCommand {
    Show,
    Add {
        book_id: String,
        #[arg(long, default_value_t = 1)]
        quantity: u32,
    },
    Remove { book_id: String },
    Update { book_id: String, quantity: u32 },
    Clear,
}

#[derive(Subcommand, Debug)]
enum CheckoutCommand {
    Shipping {
        #[arg(long)]
        address: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        postal_code: String,
        #[arg(long)]
        country: String,
    },
    Payment { method: PaymentMethod },
    Back,
    Summary,
    Place,
    /// List the sandbox cards accepted by `orders pay`
    Cards,
}

#[derive(Subcommand, Debug)]
enum OrdersCommand {
    Mine,
    Show { id: String },
    Pay {
        id: String,
        #[arg(long, default_value = "visa")]
        card: TestCard,
    },
}

#[derive(Subcommand, Debug)]
enum UsersCommand {
    List,
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        admin: Option<bool>,
    },
    Delete { id: String },
}

fn default_store_path() -> Result<PathBuf> {
    let home = home::home_dir().context("Cannot locate home directory, use --store-path")?;
    Ok(home.join(DEFAULT_STORE_DIR).join(DEFAULT_STORE_FILE))
}

fn require_session(context: &StorefrontContext) -> Result<()> {
    if !context.session.is_authenticated() {
        bail!("Not signed in, run `bookstore login` first");
    }
    Ok(())
}

fn require_admin(context: &StorefrontContext) -> Result<()> {
    require_session(context)?;
    if !context.session.is_admin() {
        bail!("Admin privileges required");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let store_path = match cli.store_path {
        Some(path) => path,
        None => default_store_path()?,
    };
    debug!(?store_path, config = ?cli.config, "Starting storefront cli");
    let storage = Arc::new(
        FileStorage::open(&store_path)
            .with_context(|| format!("Failed to open store at {}", store_path.display()))?,
    );
    let mut context =
        StorefrontContext::init(cli.config, storage, Arc::new(TerminalNotifier)).await?;
    if matches!(cli.command, Command::Watch) {
        context.start_revalidation();
    }

    let result = run(&context, cli.command).await;
    context.shutdown().await;
    result
}

async fn run(context: &StorefrontContext, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let user = context.session.login(&email, password).await?;
            output::print_user(&user);
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            let user = context.session.register(&name, &email, password).await?;
            output::print_user(&user);
        }
        Command::Logout => context.session.logout_remote().await,
        Command::Whoami => match context.session.sync_user().await {
            Some(user) => output::print_user(&user),
            None => println!("Not signed in"),
        },
        Command::Watch => watch(context).await?,
        Command::Books { command } => books(context, command).await?,
        Command::Cart { command } => cart(context, command).await?,
        Command::Checkout { command } => checkout(context, command).await?,
        Command::Orders { command } => orders(context, command).await?,
        Command::Users { command } => users(context, command).await?,
    }
    Ok(())
}

async fn watch(context: &StorefrontContext) -> Result<()> {
    require_session(context)?;
    if !context.is_revalidating() {
        bail!("Session revalidation is not running");
    }
    println!(
        "Revalidating session every {:?}, press Ctrl-C to stop",
        context.config.revalidate_interval()
    );
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping revalidation");
                break;
            }
            _ = ticker.tick() => {
                if !context.session.is_authenticated() {
                    println!("Session expired, signed out");
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn books(context: &StorefrontContext, command: BooksCommand) -> Result<()> {
    let api = &context.api;
    let asset_url = &context.config.asset_url;
    match command {
        BooksCommand::List => output::print_books(&books_api::get_books(api).await?, asset_url),
        BooksCommand::Show { id } => {
            output::print_book(&books_api::get_book_by_id(api, &id).await?, asset_url)
        }
        BooksCommand::NewReleases => {
            output::print_books(&books_api::get_new_releases(api).await?, asset_url)
        }
        BooksCommand::BestSellers => {
            output::print_books(&books_api::get_best_sellers(api).await?, asset_url)
        }
        BooksCommand::Create(book) => {
            require_admin(context)?;
            let book = books_api::create_book(api, book.into()).await?;
            output::print_book(&book, asset_url);
        }
        BooksCommand::Update { id, book } => {
            require_admin(context)?;
            let book = books_api::update_book(api, &id, book.into()).await?;
            output::print_book(&book, asset_url);
        }
        BooksCommand::Delete { id } => {
            require_admin(context)?;
            println!("{}", books_api::delete_book(api, &id).await?.message);
        }
    }
    Ok(())
}

async fn cart(context: &StorefrontContext, command: CartCommand) -> Result<()> {
    match command {
        CartCommand::Show => {}
        CartCommand::Add { book_id, quantity } => {
            let book = books_api::get_book_by_id(&context.api, &book_id).await?;
            context.cart.add_to_cart(&book, quantity)?;
        }
        CartCommand::Remove { book_id } => {
            context.cart.remove_from_cart(&book_id)?;
        }
        CartCommand::Update { book_id, quantity } => {
            context.cart.update_quantity(&book_id, quantity)?;
        }
        CartCommand::Clear => context.cart.clear_cart()?,
    }
    output::print_cart(&context.cart.items(), &context.checkout.summary(&context.cart));
    Ok(())
}

async fn checkout(context: &StorefrontContext, command: CheckoutCommand) -> Result<()> {
    match command {
        CheckoutCommand::Shipping {
            address,
            city,
            postal_code,
            country,
        } => {
            let step = context.checkout.save_shipping_address(ShippingAddress {
                address,
                city,
                postal_code,
                country,
            })?;
            println!("Next step: {step}");
        }
        CheckoutCommand::Payment { method } => {
            let step = context.checkout.save_payment_method(method)?;
            println!("Next step: {step}");
        }
        CheckoutCommand::Back => println!("Step: {}", context.checkout.back()?),
        CheckoutCommand::Summary => {
            output::print_checkout(
                &context.checkout.snapshot(),
                &context.cart.items(),
                &context.checkout.summary(&context.cart),
            );
        }
        CheckoutCommand::Place => {
            let order = context.place_order().await?;
            output::print_order(&order);
        }
        CheckoutCommand::Cards => output::print_test_cards(),
    }
    Ok(())
}

async fn orders(context: &StorefrontContext, command: OrdersCommand) -> Result<()> {
    require_session(context)?;
    match command {
        OrdersCommand::Mine => {
            for order in orders_api::get_my_orders(&context.api).await? {
                output::print_order_line(&order);
            }
        }
        OrdersCommand::Show { id } => {
            output::print_order(&orders_api::get_order_details(&context.api, &id).await?)
        }
        OrdersCommand::Pay { id, card } => {
            let order = context
                .checkout
                .pay_order(&context.api, &context.session, &id, card)
                .await?;
            output::print_order(&order);
        }
    }
    Ok(())
}

async fn users(context: &StorefrontContext, command: UsersCommand) -> Result<()> {
    require_admin(context)?;
    match command {
        UsersCommand::List => {
            for user in users_api::get_users(&context.api).await? {
                output::print_user(&user);
            }
        }
        UsersCommand::Update {
            id,
            name,
            email,
            admin,
        } => {
            let request = UpdateUserRequest {
                name,
                email,
                is_admin: admin,
            };
            output::print_user(&users_api::update_user(&context.api, &id, &request).await?);
        }
        UsersCommand::Delete { id } => {
            println!("{}", users_api::delete_user(&context.api, &id).await?.message);
        }
    }
    Ok(())
}
