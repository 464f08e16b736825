//! In-memory person storage.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A stored person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
}

/// The fields a client sends to create a person.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPerson {
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    people: BTreeMap<u64, Person>,
}

/// Person storage; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct PersonRepository {
    inner: Arc<RwLock<Inner>>,
}

impl PersonRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every person, ordered by id.
    pub async fn all(&self) -> Vec<Person> {
        self.inner.read().await.people.values().cloned().collect()
    }

    /// Returns the person with the given id.
    pub async fn get(&self, id: u64) -> Option<Person> {
        self.inner.read().await.people.get(&id).cloned()
    }

    /// Stores a new person and returns it with its assigned id.
    pub async fn save(&self, person: NewPerson) -> Person {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let person = Person {
            id: inner.next_id,
            name: person.name,
            age: person.age,
        };
        inner.people.insert(person.id, person.clone());
        person
    }

    /// Removes a person, returning `true` if it existed.
    pub async fn delete(&self, id: u64) -> bool {
        self.inner.write().await.people.remove(&id).is_some()
    }
}
