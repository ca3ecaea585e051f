use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    app::App,
    config::{parse_server_url, ClientSettings, DEFAULT_SERVER_URL, SERVER_URL_ENV},
    garage::{GarageError, GENERATED_CARS},
    AppPage, ClientError,
};
use shared::domain::{CarId, SortBy};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Terminal front end for the garage race backend")]
struct Args {
    #[arg(long, env = SERVER_URL_ENV, default_value = DEFAULT_SERVER_URL)]
    server_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List one page of the garage.
    Garage {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        color: String,
    },
    Update {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        color: String,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
    /// Create random cars.
    Generate {
        #[arg(long, default_value_t = GENERATED_CARS)]
        count: usize,
    },
    /// Race every car on a garage page.
    Race {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Winners {
        #[arg(long, value_enum)]
        sort: Option<SortColumn>,
        #[arg(long, value_enum, default_value_t = Order::Asc)]
        order: Order,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortColumn {
    Id,
    Wins,
    Time,
}

impl From<SortColumn> for SortBy {
    fn from(column: SortColumn) -> Self {
        match column {
            SortColumn::Id => SortBy::Id,
            SortColumn::Wins => SortBy::Wins,
            SortColumn::Time => SortBy::Time,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Order {
    Asc,
    Desc,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let settings = ClientSettings::new(parse_server_url(&args.server_url)?);
    debug!(server_url = %settings.server_url, "race_cli: connecting");
    let mut app = App::connect(&settings);
    app.start()
        .await
        .with_context(|| format!("cannot load the garage from {}", settings.server_url))?;

    match args.command {
        Command::Garage { page } => {
            goto_garage_page(&mut app, page).await?;
            print_garage(&app);
        }
        Command::Create { name, color } => {
            let car = app.create_car(&name, &color).await?;
            println!("created car {} {} {}", car.id, car.name, car.color);
        }
        Command::Update { id, name, color } => {
            select_anywhere(&mut app, CarId(id)).await?;
            let car = app.update_selected_car(&name, &color).await?;
            println!("updated car {} {} {}", car.id, car.name, car.color);
        }
        Command::Delete { id } => {
            app.delete_car(CarId(id)).await?;
            println!("deleted car {id}");
        }
        Command::Generate { count } => {
            let created = app.generate_cars(count).await?;
            println!("generated {created} cars");
        }
        Command::Race { page } => {
            goto_garage_page(&mut app, page).await?;
            match app.race().await? {
                Some(winner) => println!(
                    "{} won in {:.2}s",
                    winner.car.name,
                    winner.seconds()
                ),
                None => println!("no car finished"),
            }
        }
        Command::Winners { sort, order, page } => {
            if let Some(column) = sort {
                app.sort_winners(column.into()).await?;
                if order == Order::Desc {
                    app.sort_winners(column.into()).await?;
                }
            }
            app.navigate(AppPage::Winners).await?;
            for _ in 1..page {
                if app.next_winners_page().await?.is_none() {
                    bail!("winners page {page} does not exist");
                }
            }
            print_winners(&app);
        }
    }
    Ok(())
}

async fn goto_garage_page(app: &mut App, page: u32) -> Result<()> {
    for _ in 1..page {
        if app.next_garage_page().await?.is_none() {
            bail!("garage page {page} does not exist");
        }
    }
    Ok(())
}

/// Pages through the garage until `car_id` can be selected.
async fn select_anywhere(app: &mut App, car_id: CarId) -> Result<()> {
    loop {
        match app.select_car(car_id).await {
            Ok(_) => return Ok(()),
            Err(ClientError::Garage(GarageError::NotOnPage(_))) => {
                if app.next_garage_page().await?.is_none() {
                    bail!("car {car_id} is not in the garage");
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn print_garage(app: &App) {
    let details = app.garage().pagination().details();
    println!(
        "{} ({}) page {}/{}",
        details.title,
        details.total_items,
        details.current_page,
        details.total_pages.max(1)
    );
    for car in app.garage_state().cars.iter() {
        println!("{:>5}  {}  {}", car.id.0, car.color, car.name);
    }
}

fn print_winners(app: &App) {
    let winners = app.winners();
    let details = winners.pagination().details();
    println!(
        "{} ({}) page {}/{}",
        details.title,
        details.total_items,
        details.current_page,
        details.total_pages.max(1)
    );
    println!("{:>4}  {:>5}  {:<7}  {:<24}  {:>4}  {:>8}", "#", "car", "color", "name", "wins", "time");
    for row in winners.rows() {
        println!(
            "{:>4}  {:>5}  {:<7}  {:<24}  {:>4}  {:>8}",
            row.rank, row.car_id.0, row.color, row.name, row.wins, row.time
        );
    }
}
