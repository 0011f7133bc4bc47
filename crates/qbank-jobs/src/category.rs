//! In-memory category store.

use async_trait::async_trait;
use chrono::Utc;
use qbank_types::{
    Category, CategoryError, CategoryOrder, CategoryStore, CategoryUpdate, NewCategory,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Categories seeded by [`InMemoryCategoryStore::with_defaults`]. The last one is the default.
const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Mathematics", "Mathematics questions"),
    ("Chinese", "Chinese language questions"),
    ("English", "English language questions"),
    ("Physics", "Physics questions"),
    ("Chemistry", "Chemistry questions"),
    ("Biology", "Biology questions"),
    ("History", "History questions"),
    ("Geography", "Geography questions"),
    ("Politics", "Politics questions"),
    ("Other", "Uncategorized questions"),
];

struct Inner {
    next_id: u64,
    by_id: BTreeMap<u64, Category>,
}

/// CategoryStore backed by a map; ids are assigned sequentially from 1.
pub struct InMemoryCategoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryCategoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                next_id: 1,
                by_id: BTreeMap::new(),
            })),
        }
    }

    /// Store pre-filled with the standard subject categories.
    pub fn with_defaults() -> Self {
        let now = Utc::now();
        let mut by_id = BTreeMap::new();
        for (i, (name, description)) in DEFAULT_CATEGORIES.iter().enumerate() {
            let id = i as u64 + 1;
            by_id.insert(
                id,
                Category {
                    id,
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    sort_order: id as i32,
                    is_default: i + 1 == DEFAULT_CATEGORIES.len(),
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Self {
            inner: Arc::new(RwLock::new(Inner {
                next_id: DEFAULT_CATEGORIES.len() as u64 + 1,
                by_id,
            })),
        }
    }
}

impl Default for InMemoryCategoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CategoryStore for InMemoryCategoryStore {
    async fn list(&self) -> Result<Vec<Category>, CategoryError> {
        let guard = self.inner.read().await;
        let mut out: Vec<Category> = guard.by_id.values().cloned().collect();
        out.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(out)
    }

    async fn get(&self, id: u64) -> Result<Option<Category>, CategoryError> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }

    async fn create(&self, req: NewCategory) -> Result<Category, CategoryError> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(CategoryError::EmptyName);
        }
        let mut guard = self.inner.write().await;
        if guard.by_id.values().any(|c| c.name == name) {
            return Err(CategoryError::Conflict(name));
        }
        let sort_order = match req.sort_order {
            Some(s) => s,
            None => guard.by_id.values().map(|c| c.sort_order).max().unwrap_or(0) + 1,
        };
        let now = Utc::now();
        let id = guard.next_id;
        guard.next_id += 1;
        let category = Category {
            id,
            name,
            description: req
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            sort_order,
            is_default: req.is_default,
            created_at: now,
            updated_at: now,
        };
        guard.by_id.insert(id, category.clone());
        tracing::info!(category_id = id, name = %category.name, "category created");
        Ok(category)
    }

    async fn update(&self, id: u64, req: CategoryUpdate) -> Result<Category, CategoryError> {
        let mut guard = self.inner.write().await;
        if !guard.by_id.contains_key(&id) {
            return Err(CategoryError::NotFound(id));
        }
        if req.is_empty() {
            return Err(CategoryError::EmptyUpdate);
        }
        let name = match req.name {
            Some(n) => {
                let n = n.trim().to_string();
                if n.is_empty() {
                    return Err(CategoryError::EmptyName);
                }
                if guard.by_id.values().any(|c| c.id != id && c.name == n) {
                    return Err(CategoryError::Conflict(n));
                }
                Some(n)
            }
            None => None,
        };
        let Some(category) = guard.by_id.get_mut(&id) else {
            return Err(CategoryError::NotFound(id));
        };
        if let Some(n) = name {
            category.name = n;
        }
        if let Some(d) = req.description {
            let d = d.trim().to_string();
            category.description = (!d.is_empty()).then_some(d);
        }
        if let Some(order) = req.sort_order {
            category.sort_order = order;
        }
        if let Some(is_default) = req.is_default {
            category.is_default = is_default;
        }
        category.updated_at = Utc::now();
        tracing::info!(category_id = id, name = %category.name, "category updated");
        Ok(category.clone())
    }

    async fn delete(&self, id: u64) -> Result<Category, CategoryError> {
        let mut guard = self.inner.write().await;
        match guard.by_id.get(&id) {
            None => return Err(CategoryError::NotFound(id)),
            Some(c) if c.is_default => return Err(CategoryError::Protected(c.name.clone())),
            Some(_) => {}
        }
        let removed = guard
            .by_id
            .remove(&id)
            .ok_or(CategoryError::NotFound(id))?;
        tracing::info!(category_id = id, name = %removed.name, "category deleted");
        Ok(removed)
    }

    async fn reorder(&self, orders: &[CategoryOrder]) -> Result<usize, CategoryError> {
        let mut guard = self.inner.write().await;
        let now = Utc::now();
        let mut changed = 0;
        for order in orders {
            if let Some(c) = guard.by_id.get_mut(&order.id) {
                c.sort_order = order.sort_order;
                c.updated_at = now;
                changed += 1;
            }
        }
        tracing::debug!(changed, requested = orders.len(), "categories reordered");
        Ok(changed)
    }
}
