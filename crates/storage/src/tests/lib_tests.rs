use super::*;

async fn memory_storage() -> Storage {
    Storage::new("sqlite::memory:").await.expect("db")
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = memory_storage().await;
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("async_race_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn lists_cars_by_page_with_total() {
    let storage = memory_storage().await;
    for index in 0..9 {
        storage
            .create_car(&format!("car-{index}"), "#000000")
            .await
            .expect("car");
    }

    let second_page = storage
        .list_cars(PageQuery::new(2, 7))
        .await
        .expect("page");
    assert_eq!(second_page.total, 9);
    assert_eq!(second_page.items.len(), 2);
    assert_eq!(second_page.items[0].name, "car-7");

    let everything = storage.list_cars(PageQuery::default()).await.expect("all");
    assert_eq!(everything.items.len(), 9);
}

#[tokio::test]
async fn updates_and_deletes_cars() {
    let storage = memory_storage().await;
    let car = storage.create_car("Toyota", "#ff0000").await.expect("car");

    let updated = storage
        .update_car(car.id, "Toyota Supra", "#00ff00")
        .await
        .expect("update")
        .expect("car exists");
    assert_eq!(updated.name, "Toyota Supra");
    assert_eq!(updated.color, "#00ff00");

    assert!(storage.delete_car(car.id).await.expect("delete"));
    assert!(!storage.delete_car(car.id).await.expect("second delete"));
    assert!(storage.get_car(car.id).await.expect("get").is_none());
    assert!(storage
        .update_car(car.id, "ghost", "#000000")
        .await
        .expect("update missing")
        .is_none());
}

#[tokio::test]
async fn record_result_creates_then_accumulates() {
    let storage = memory_storage().await;
    let car = CarId(5);

    let first = storage.record_result(car, 12.34).await.expect("first");
    assert_eq!(
        first,
        Winner {
            id: car,
            wins: 1,
            time: 12.34
        }
    );

    storage.update_winner(car, 3, 10.0).await.expect("seed");
    let faster = storage.record_result(car, 9.5).await.expect("faster");
    assert_eq!(faster.wins, 4);
    assert_eq!(faster.time, 9.5);

    storage.update_winner(car, 3, 10.0).await.expect("seed");
    let slower = storage.record_result(car, 11.0).await.expect("slower");
    assert_eq!(slower.wins, 4);
    assert_eq!(slower.time, 10.0);
}

#[tokio::test]
async fn create_winner_rejects_duplicates() {
    let storage = memory_storage().await;
    let winner = Winner {
        id: CarId(1),
        wins: 1,
        time: 3.0,
    };
    assert!(storage.create_winner(winner).await.expect("create").is_some());
    assert!(storage.create_winner(winner).await.expect("duplicate").is_none());
    assert!(storage.delete_winner(CarId(1)).await.expect("delete"));
    assert!(storage.get_winner(CarId(1)).await.expect("get").is_none());
}

#[tokio::test]
async fn lists_winners_sorted_and_paged() {
    let storage = memory_storage().await;
    for (id, wins, time) in [(1, 3, 4.5), (2, 1, 2.0), (3, 5, 9.0)] {
        storage
            .create_winner(Winner {
                id: CarId(id),
                wins,
                time,
            })
            .await
            .expect("winner");
    }

    let by_wins_desc = storage
        .list_winners(WinnersQuery {
            page: Some(1),
            limit: Some(2),
            sort: Some(SortBy::Wins),
            order: Some(SortOrder::Desc),
        })
        .await
        .expect("winners");
    assert_eq!(by_wins_desc.total, 3);
    let ids: Vec<i64> = by_wins_desc.items.iter().map(|w| w.id.0).collect();
    assert_eq!(ids, vec![3, 1]);

    let by_time = storage
        .list_winners(WinnersQuery {
            sort: Some(SortBy::Time),
            ..WinnersQuery::default()
        })
        .await
        .expect("winners");
    let ids: Vec<i64> = by_time.items.iter().map(|w| w.id.0).collect();
    assert_eq!(ids, vec![2, 1, 3]);
}
