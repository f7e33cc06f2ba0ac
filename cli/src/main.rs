use std::cell::RefCell;
use std::rc::Rc;

use canvas::consts::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use canvas::geometry::{Point, Size};
use clap::{Args, Parser, Subcommand};
use stickerboard::config::{ClientConfig, ConfigError};
use stickerboard::net::api::{ApiClient, ApiError, submit_outbound};
use stickerboard::net::live::{LiveError, LiveSession};
use stickerboard::net::router::Handler;
use stickerboard::net::types::{Sticker, StickerId};
use stickerboard::sync::BoardSyncClient;
use stickerboard::util::color::StickerColor;
use tracing_subscriber::EnvFilter;
use wire::StickerFields;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Live(#[from] LiveError),
    #[error("missing board id; pass --board-id or set STICKERBOARD_BOARD_ID")]
    MissingBoard,
    #[error("unknown color `{0}`; use a palette name or hex value")]
    InvalidColor(String),
    #[error("sticker {0} not found on this board")]
    UnknownSticker(i64),
    #[error("nothing to change; pass at least one field")]
    EmptyPatch,
    #[error("server rejected {0} mutation(s)")]
    Rejected(usize),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("signal handler failed: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "stickerboard-cli", about = "Sticker board sync CLI")]
struct Cli {
    #[arg(long, env = "STICKERBOARD_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "STICKERBOARD_TOKEN")]
    token: Option<String>,

    #[arg(long, env = "STICKERBOARD_BOARD_ID")]
    board_id: Option<i64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the board snapshot as JSON.
    Board,
    /// Stream live changes until interrupted.
    Watch,
    /// Add a sticker.
    Add(AddArgs),
    /// Change fields of a sticker.
    Patch(PatchArgs),
    /// Delete a sticker.
    Delete { sticker_id: i64 },
}

#[derive(Args, Debug)]
struct AddArgs {
    #[arg(long, default_value_t = 0.0)]
    x: f64,
    #[arg(long, default_value_t = 0.0)]
    y: f64,
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    width: f64,
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    height: f64,
    #[arg(long, default_value = "yellow")]
    color: String,
    #[arg(long)]
    text: Option<String>,
}

#[derive(Args, Debug)]
struct PatchArgs {
    sticker_id: i64,
    #[arg(long)]
    x: Option<f64>,
    #[arg(long)]
    y: Option<f64>,
    #[arg(long)]
    width: Option<f64>,
    #[arg(long)]
    height: Option<f64>,
    #[arg(long)]
    color: Option<String>,
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    layer: Option<i64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(token) = cli.token {
        config.token = Some(token);
    }
    if let Some(board_id) = cli.board_id {
        config.board_id = Some(board_id);
    }
    let board_id = config.board_id.ok_or(CliError::MissingBoard)?;
    let api = ApiClient::from_config(&config)?;

    match cli.command {
        Command::Board => run_board(&api, board_id).await,
        Command::Watch => run_watch(&config, api, board_id).await,
        Command::Add(args) => run_add(&config, &api, board_id, args).await,
        Command::Patch(args) => run_patch(&config, &api, board_id, args).await,
        Command::Delete { sticker_id } => run_delete(&config, &api, board_id, sticker_id).await,
    }
}

async fn run_board(api: &ApiClient, board_id: i64) -> Result<(), CliError> {
    let snapshot = api.fetch_board(board_id).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn run_watch(config: &ClientConfig, api: ApiClient, board_id: i64) -> Result<(), CliError> {
    let client = load_client(config, &api, board_id).await?;
    for sticker in client.borrow().state().stickers_in_layer_order() {
        print_sticker("sticker", sticker);
    }
    subscribe_printers(&mut client.borrow_mut());

    let (session, handle) = LiveSession::new(Rc::clone(&client));
    let run = session.with_api(api).run();
    tokio::pin!(run);

    let reason = tokio::select! {
        result = &mut run => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            handle.disconnect();
            run.await?
        }
    };
    tracing::info!(?reason, "watch finished");
    Ok(())
}

async fn run_add(config: &ClientConfig, api: &ApiClient, board_id: i64, args: AddArgs) -> Result<(), CliError> {
    let color = parse_color(&args.color)?;
    let client = load_client(config, api, board_id).await?;
    let id = {
        let mut client = client.borrow_mut();
        let id = client.add_sticker(Point::new(args.x, args.y), Size::new(args.width, args.height), color);
        if let Some(text) = args.text {
            client.patch_sticker(id, StickerFields { text: Some(text), ..StickerFields::default() });
        }
        id
    };
    flush(&client, api, board_id).await?;

    let client = client.borrow();
    if let Some(sticker) = client.state().sticker(client.resolve(id)) {
        print_sticker("created", sticker);
    }
    Ok(())
}

async fn run_patch(config: &ClientConfig, api: &ApiClient, board_id: i64, args: PatchArgs) -> Result<(), CliError> {
    let color = args.color.as_deref().map(parse_color).transpose()?;
    let fields = StickerFields {
        x: args.x,
        y: args.y,
        width: args.width,
        height: args.height,
        color: color.map(|c| c.to_hex().to_owned()),
        text: args.text,
        layer_level: args.layer,
    };
    if fields.is_empty() {
        return Err(CliError::EmptyPatch);
    }

    let client = load_client(config, api, board_id).await?;
    let id = StickerId::Server(args.sticker_id);
    if !client.borrow_mut().patch_sticker(id, fields) {
        return Err(CliError::UnknownSticker(args.sticker_id));
    }
    flush(&client, api, board_id).await?;

    if let Some(sticker) = client.borrow().state().sticker(id) {
        print_sticker("updated", sticker);
    }
    Ok(())
}

async fn run_delete(config: &ClientConfig, api: &ApiClient, board_id: i64, sticker_id: i64) -> Result<(), CliError> {
    let client = load_client(config, api, board_id).await?;
    if !client.borrow_mut().delete_sticker(StickerId::Server(sticker_id)) {
        return Err(CliError::UnknownSticker(sticker_id));
    }
    flush(&client, api, board_id).await?;
    println!("deleted\t{sticker_id}");
    Ok(())
}

async fn load_client(
    config: &ClientConfig,
    api: &ApiClient,
    board_id: i64,
) -> Result<Rc<RefCell<BoardSyncClient>>, CliError> {
    let snapshot = api.fetch_board(board_id).await?;
    let mut client = BoardSyncClient::new(config);
    client.load_snapshot(snapshot);
    Ok(Rc::new(RefCell::new(client)))
}

async fn flush(client: &RefCell<BoardSyncClient>, api: &ApiClient, board_id: i64) -> Result<(), CliError> {
    match submit_outbound(client, api, board_id).await {
        0 => Ok(()),
        rejected => Err(CliError::Rejected(rejected)),
    }
}

fn subscribe_printers(client: &mut BoardSyncClient) {
    client.subscribe(Handler::sticker_created(|p| {
        println!("created\t{}\t{:.0},{:.0}\t{}\t{}", p.sticker_id, p.x, p.y, p.color, p.text);
    }));
    client.subscribe(Handler::sticker_updated(|p| {
        println!("updated\t{}\t{}", p.sticker_id, serde_json::to_string(&p.fields).unwrap_or_default());
    }));
    client.subscribe(Handler::sticker_deleted(|p| println!("deleted\t{}", p.sticker_id)));
    client.subscribe(Handler::board_updated(|p| {
        println!("board\t{}\t{}", p.board_id, p.title.as_deref().unwrap_or(""));
    }));
    client.subscribe(Handler::board_deleted(|p| println!("board-deleted\t{}", p.board_id)));
    client.subscribe(Handler::connected(|p| println!("participants\t{}", p.connection_count)));
    client.subscribe(Handler::user_joined(|p| println!("participants\t{}", p.connection_count)));
    client.subscribe(Handler::user_left(|p| println!("participants\t{}", p.connection_count)));
}

fn print_sticker(label: &str, sticker: &Sticker) {
    println!(
        "{label}\t{}\t{:.0},{:.0}\t{:.0}x{:.0}\t{}\t{}",
        sticker.id,
        sticker.position.x,
        sticker.position.y,
        sticker.size.width,
        sticker.size.height,
        sticker.color,
        sticker.text
    );
}

fn parse_color(raw: &str) -> Result<StickerColor, CliError> {
    StickerColor::from_token(raw)
        .or_else(|| StickerColor::try_from_hex(raw))
        .ok_or_else(|| CliError::InvalidColor(raw.to_owned()))
}
