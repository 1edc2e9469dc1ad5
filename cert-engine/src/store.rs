use crate::error::{CertError, CertResult};
use crate::models::{CertificateId, CertificateMaterial, CertificateRecord, RecordSummary};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Storage for certificate records
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Assign the next identifier to `material` and insert it as one step
    async fn put(&self, material: CertificateMaterial) -> CertificateId;

    /// Fetch a record by identifier
    async fn get(&self, id: CertificateId) -> CertResult<Arc<CertificateRecord>>;

    /// Snapshot of all records as `{id, subject}`, ascending by id
    async fn list(&self) -> Vec<RecordSummary>;
}

struct StoreState {
    next_id: u64,
    records: BTreeMap<CertificateId, Arc<CertificateRecord>>,
}

/// Process-lifetime record store. Records are never updated or removed.
pub struct InMemoryCertificateStore {
    state: RwLock<StoreState>,
}

impl InMemoryCertificateStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                next_id: 1,
                records: BTreeMap::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCertificateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CertificateStore for InMemoryCertificateStore {
    async fn put(&self, material: CertificateMaterial) -> CertificateId {
        let mut state = self.state.write();
        let id = CertificateId::new(state.next_id);
        state.next_id = state.next_id.saturating_add(1);
        state
            .records
            .insert(id, Arc::new(CertificateRecord::new(id, material)));
        id
    }

    async fn get(&self, id: CertificateId) -> CertResult<Arc<CertificateRecord>> {
        self.state
            .read()
            .records
            .get(&id)
            .cloned()
            .ok_or(CertError::NotFound(id))
    }

    async fn list(&self) -> Vec<RecordSummary> {
        self.state
            .read()
            .records
            .values()
            .map(|record| record.summary())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CertificateInfo, RecordOrigin, RecordPublicKey, SubjectName};
    use chrono::Utc;
    use rsa::RsaPrivateKey;
    use std::collections::HashSet;

    fn test_public_key() -> RecordPublicKey {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        RecordPublicKey::from_rsa(key.to_public_key()).unwrap()
    }

    fn material(common_name: &str, public_key: &RecordPublicKey) -> CertificateMaterial {
        let now = Utc::now();
        CertificateMaterial {
            template: rcgen::CertificateParams::default(),
            info: CertificateInfo::new(SubjectName::with_common_name(common_name)),
            is_ca: false,
            serial: vec![1, 2, 3],
            not_before: now,
            not_after: now,
            public_key: public_key.clone(),
            private_key: None,
            origin: RecordOrigin::Imported,
        }
    }

    #[tokio::test]
    async fn test_put_assigns_increasing_ids_from_one() {
        let store = InMemoryCertificateStore::new();
        let key = test_public_key();

        let first = store.put(material("a", &key)).await;
        let second = store.put(material("b", &key)).await;

        assert_eq!(first, CertificateId::new(1));
        assert_eq!(second, CertificateId::new(2));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let store = InMemoryCertificateStore::new();
        let err = store.get(CertificateId::new(7)).await.unwrap_err();
        assert!(matches!(err, CertError::NotFound(id) if id == CertificateId::new(7)));
    }

    #[tokio::test]
    async fn test_get_returns_stored_record() {
        let store = InMemoryCertificateStore::new();
        let key = test_public_key();
        let id = store.put(material("stored", &key)).await;

        let record = store.get(id).await.unwrap();
        assert_eq!(record.id(), id);
        assert_eq!(record.subject().common_name, "stored");
        assert!(record.private_key().is_none());
    }

    #[tokio::test]
    async fn test_list_is_ordered_snapshot() {
        let store = InMemoryCertificateStore::new();
        assert!(store.list().await.is_empty());

        let key = test_public_key();
        for name in ["one", "two", "three"] {
            store.put(material(name, &key)).await;
        }

        let names: Vec<_> = store
            .list()
            .await
            .into_iter()
            .map(|summary| (summary.id.value(), summary.subject.common_name))
            .collect();
        assert_eq!(
            names,
            vec![
                (1, "one".to_string()),
                (2, "two".to_string()),
                (3, "three".to_string()),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_get_distinct_ids() {
        let store = Arc::new(InMemoryCertificateStore::new());
        let key = test_public_key();

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = Arc::clone(&store);
            let material = material(&format!("cert-{}", i), &key);
            handles.push(tokio::spawn(async move { store.put(material).await }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            assert!(ids.insert(handle.await.unwrap()));
        }
        assert_eq!(ids.len(), 50);
        assert_eq!(ids.iter().map(|id| id.value()).max(), Some(50));
    }
}
