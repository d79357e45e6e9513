//! In-memory owner store
//!
//! Entity storage is an external collaborator of the fabric; this adapter
//! stands in for one behind a plain get/put/delete surface.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Owner {
    pub id: u64,
    pub name: String,
    pub age: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OwnerDraft {
    pub name: String,
    pub age: f32,
}

pub struct OwnerStore {
    rows: RwLock<HashMap<u64, Owner>>,
    next_id: AtomicU64,
}

impl OwnerStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Demo rows, matching the sample data the fleet seeds reference.
    pub async fn seeded() -> Self {
        let store = Self::new();
        store
            .create(OwnerDraft {
                name: "Ahmed Bennani".to_string(),
                age: 30.0,
            })
            .await;
        store
            .create(OwnerDraft {
                name: "Fatima Zahra".to_string(),
                age: 25.0,
            })
            .await;
        store
            .create(OwnerDraft {
                name: "Youssef Alami".to_string(),
                age: 35.0,
            })
            .await;
        store
    }

    pub async fn list(&self) -> Vec<Owner> {
        let rows = self.rows.read().await;
        let mut owners: Vec<Owner> = rows.values().cloned().collect();
        owners.sort_by_key(|o| o.id);
        owners
    }

    pub async fn get(&self, id: u64) -> Option<Owner> {
        self.rows.read().await.get(&id).cloned()
    }

    pub async fn create(&self, draft: OwnerDraft) -> Owner {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let owner = Owner {
            id,
            name: draft.name,
            age: draft.age,
        };
        self.rows.write().await.insert(id, owner.clone());
        owner
    }

    pub async fn update(&self, id: u64, draft: OwnerDraft) -> Option<Owner> {
        let mut rows = self.rows.write().await;
        let owner = rows.get_mut(&id)?;
        owner.name = draft.name;
        owner.age = draft.age;
        Some(owner.clone())
    }

    pub async fn delete(&self, id: u64) -> bool {
        self.rows.write().await.remove(&id).is_some()
    }
}
