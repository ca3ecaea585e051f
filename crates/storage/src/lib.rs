use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{Car, CarId, SortBy, SortOrder, Winner},
    protocol::{PageQuery, Paged, WinnersQuery},
};

const MEMORY_DATABASE_URL: &str = "sqlite::memory:";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` opens a fresh database, so the
        // pool must never grow past one connection there.
        let max_connections = if database_url.starts_with(MEMORY_DATABASE_URL) {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_car(&self, name: &str, color: &str) -> Result<Car> {
        let row = sqlx::query("INSERT INTO cars (name, color) VALUES (?, ?) RETURNING id, name, color")
            .bind(name)
            .bind(color)
            .fetch_one(&self.pool)
            .await?;
        Ok(car_from_row(&row))
    }

    pub async fn get_car(&self, car_id: CarId) -> Result<Option<Car>> {
        let row = sqlx::query("SELECT id, name, color FROM cars WHERE id = ?")
            .bind(car_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(car_from_row))
    }

    pub async fn list_cars(&self, query: PageQuery) -> Result<Paged<Car>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cars")
            .fetch_one(&self.pool)
            .await?;
        let rows = match query.window() {
            Some((limit, offset)) => {
                sqlx::query("SELECT id, name, color FROM cars ORDER BY id ASC LIMIT ? OFFSET ?")
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT id, name, color FROM cars ORDER BY id ASC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(Paged::new(
            rows.iter().map(car_from_row).collect(),
            count_to_usize(total),
        ))
    }

    pub async fn update_car(&self, car_id: CarId, name: &str, color: &str) -> Result<Option<Car>> {
        let row = sqlx::query(
            "UPDATE cars SET name = ?, color = ? WHERE id = ? RETURNING id, name, color",
        )
        .bind(name)
        .bind(color)
        .bind(car_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(car_from_row))
    }

    pub async fn delete_car(&self, car_id: CarId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cars WHERE id = ?")
            .bind(car_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Inserts a winner record; `None` when a record for the car exists
    /// already.
    pub async fn create_winner(&self, winner: Winner) -> Result<Option<Winner>> {
        let row = sqlx::query(
            "INSERT INTO winners (id, wins, time) VALUES (?, ?, ?)
             ON CONFLICT(id) DO NOTHING
             RETURNING id, wins, time",
        )
        .bind(winner.id.0)
        .bind(i64::from(winner.wins))
        .bind(winner.time)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(winner_from_row))
    }

    pub async fn get_winner(&self, car_id: CarId) -> Result<Option<Winner>> {
        let row = sqlx::query("SELECT id, wins, time FROM winners WHERE id = ?")
            .bind(car_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(winner_from_row))
    }

    pub async fn list_winners(&self, query: WinnersQuery) -> Result<Paged<Winner>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM winners")
            .fetch_one(&self.pool)
            .await?;

        let column = query.sort.unwrap_or(SortBy::Id);
        let order = query.order.unwrap_or(SortOrder::Asc);
        // Both parts come from closed enums; ties fall back to id for a stable
        // page boundary.
        let mut sql = format!(
            "SELECT id, wins, time FROM winners ORDER BY {} {}, id ASC",
            column.as_str(),
            order.as_str()
        );

        let rows = match query.page_query().window() {
            Some((limit, offset)) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                sqlx::query(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => sqlx::query(&sql).fetch_all(&self.pool).await?,
        };
        Ok(Paged::new(
            rows.iter().map(winner_from_row).collect(),
            count_to_usize(total),
        ))
    }

    pub async fn update_winner(&self, car_id: CarId, wins: u32, time: f64) -> Result<Option<Winner>> {
        let row = sqlx::query(
            "UPDATE winners SET wins = ?, time = ? WHERE id = ? RETURNING id, wins, time",
        )
        .bind(i64::from(wins))
        .bind(time)
        .bind(car_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(winner_from_row))
    }

    pub async fn delete_winner(&self, car_id: CarId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM winners WHERE id = ?")
            .bind(car_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Folds one finished race into the car's winner record in a single
    /// statement: first win inserts `{1, time}`, later wins add one and keep
    /// the lower time.
    pub async fn record_result(&self, car_id: CarId, time: f64) -> Result<Winner> {
        let row = sqlx::query(
            "INSERT INTO winners (id, wins, time) VALUES (?, 1, ?)
             ON CONFLICT(id) DO UPDATE SET
                 wins = winners.wins + 1,
                 time = MIN(winners.time, excluded.time)
             RETURNING id, wins, time",
        )
        .bind(car_id.0)
        .bind(time)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to record race result for car {car_id}"))?;
        Ok(winner_from_row(&row))
    }
}

fn car_from_row(row: &SqliteRow) -> Car {
    Car {
        id: CarId(row.get::<i64, _>("id")),
        name: row.get::<String, _>("name"),
        color: row.get::<String, _>("color"),
    }
}

fn winner_from_row(row: &SqliteRow) -> Winner {
    Winner {
        id: CarId(row.get::<i64, _>("id")),
        wins: u32::try_from(row.get::<i64, _>("wins")).unwrap_or(u32::MAX),
        time: row.get::<f64, _>("time"),
    }
}

fn count_to_usize(count: i64) -> usize {
    usize::try_from(count).unwrap_or_default()
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with(MEMORY_DATABASE_URL) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
