//! In-memory car store
//!
//! Cars carry an `owner_id` foreign key; the `owner` field is composed at
//! request time from the owner service and never stored here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Owner as the owner service serves it. A local model, not a stored row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub id: u64,
    pub name: String,
    pub age: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Car {
    pub id: u64,
    pub make: String,
    pub plate: String,
    pub model: String,
    pub owner_id: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub owner: Option<Owner>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CarDraft {
    pub make: String,
    pub plate: String,
    pub model: String,
    pub owner_id: u64,
}

pub struct CarStore {
    rows: RwLock<HashMap<u64, Car>>,
    next_id: AtomicU64,
}

impl CarStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn seeded() -> Self {
        let store = Self::new();
        for (make, plate, model, owner_id) in [
            ("Toyota", "A-123-BC", "Corolla", 1),
            ("Renault", "B-456-DE", "Megane", 2),
            ("Peugeot", "C-789-FG", "308", 1),
            ("Mercedes", "D-012-HI", "Classe A", 3),
        ] {
            store
                .create(CarDraft {
                    make: make.to_string(),
                    plate: plate.to_string(),
                    model: model.to_string(),
                    owner_id,
                })
                .await;
        }
        store
    }

    pub async fn list(&self) -> Vec<Car> {
        let rows = self.rows.read().await;
        let mut cars: Vec<Car> = rows.values().cloned().collect();
        cars.sort_by_key(|c| c.id);
        cars
    }

    pub async fn list_by_owner(&self, owner_id: u64) -> Vec<Car> {
        let rows = self.rows.read().await;
        let mut cars: Vec<Car> = rows
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        cars.sort_by_key(|c| c.id);
        cars
    }

    pub async fn get(&self, id: u64) -> Option<Car> {
        self.rows.read().await.get(&id).cloned()
    }

    pub async fn create(&self, draft: CarDraft) -> Car {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let car = Car {
            id,
            make: draft.make,
            plate: draft.plate,
            model: draft.model,
            owner_id: draft.owner_id,
            owner: None,
        };
        self.rows.write().await.insert(id, car.clone());
        car
    }

    pub async fn update(&self, id: u64, draft: CarDraft) -> Option<Car> {
        let mut rows = self.rows.write().await;
        let car = rows.get_mut(&id)?;
        car.make = draft.make;
        car.plate = draft.plate;
        car.model = draft.model;
        car.owner_id = draft.owner_id;
        Some(car.clone())
    }

    pub async fn delete(&self, id: u64) -> bool {
        self.rows.write().await.remove(&id).is_some()
    }
}
