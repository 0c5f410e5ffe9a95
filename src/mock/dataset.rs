use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{
    ActivityLog, Contract, Entity, Message, Partner, Property, Statistics, Transaction, User,
};
use crate::mock::generators::{
    generate_activity_logs, generate_contracts, generate_messages, generate_partners,
    generate_properties, generate_transactions, generate_users, super_admin,
};
use crate::store::{entity_payload, BatchOperation, DocumentStore, StoreResult, MAX_BATCH_WRITES};

/// How many records of each kind [`MockDataset::generate_with`] creates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MockSizes {
    /// Generated users besides the super administrator.
    pub users: u32,
    pub properties: usize,
    pub transactions: usize,
    pub contracts: usize,
    pub messages: usize,
    pub partners: usize,
    pub activity_logs: usize,
}

impl Default for MockSizes {
    fn default() -> Self {
        Self {
            users: 39,
            properties: 60,
            transactions: 120,
            contracts: 30,
            messages: 50,
            partners: 10,
            activity_logs: 80,
        }
    }
}

/// Every mock collection plus the aggregates computed from them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockDataset {
    pub users: Vec<User>,
    pub properties: Vec<Property>,
    pub transactions: Vec<Transaction>,
    pub contracts: Vec<Contract>,
    pub messages: Vec<Message>,
    pub partners: Vec<Partner>,
    pub activity_logs: Vec<ActivityLog>,
    pub statistics: Statistics,
}

impl MockDataset {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::generate_with(rng, MockSizes::default())
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, sizes: MockSizes) -> Self {
        let mut users = vec![super_admin()];
        users.extend(generate_users(rng, 2..=sizes.users + 1));
        let properties = generate_properties(rng, sizes.properties);
        let transactions = generate_transactions(rng, sizes.transactions);
        let contracts = generate_contracts(rng, sizes.contracts);
        let messages = generate_messages(rng, sizes.messages);
        let statistics =
            Statistics::compute(&users, &properties, &transactions, &contracts, &messages);
        Self {
            users,
            properties,
            transactions,
            contracts,
            messages,
            partners: generate_partners(rng, sizes.partners),
            activity_logs: generate_activity_logs(rng, sizes.activity_logs),
            statistics,
        }
    }

    /// Number of documents [`seed_store`] writes for this dataset.
    pub fn document_count(&self) -> usize {
        self.users.len()
            + self.properties.len()
            + self.transactions.len()
            + self.contracts.len()
            + self.messages.len()
            + self.partners.len()
            + self.activity_logs.len()
    }

    fn operations(&self) -> StoreResult<Vec<BatchOperation>> {
        let mut operations = Vec::with_capacity(self.document_count());
        push_all(&mut operations, &self.users)?;
        push_all(&mut operations, &self.properties)?;
        push_all(&mut operations, &self.transactions)?;
        push_all(&mut operations, &self.contracts)?;
        push_all(&mut operations, &self.messages)?;
        push_all(&mut operations, &self.partners)?;
        push_all(&mut operations, &self.activity_logs)?;
        Ok(operations)
    }
}

fn push_all<T: Entity>(operations: &mut Vec<BatchOperation>, entities: &[T]) -> StoreResult<()> {
    for entity in entities {
        operations.push(BatchOperation::merge(
            T::COLLECTION,
            entity.id(),
            entity_payload(entity)?,
        ));
    }
    Ok(())
}

/// Writes `dataset` into `store` in batches of at most [`MAX_BATCH_WRITES`].
///
/// Records are merged so the generated `createdAt` values survive. Returns the
/// number of documents written. A failing batch stops the seeding; earlier
/// batches stay committed.
pub async fn seed_store(store: &DocumentStore, dataset: &MockDataset) -> StoreResult<usize> {
    let operations = dataset.operations()?;
    for (index, chunk) in operations.chunks(MAX_BATCH_WRITES).enumerate() {
        log::debug!("seeding batch {} ({} writes)", index + 1, chunk.len());
        store.run_batch(chunk).await?;
    }
    Ok(operations.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn dataset_starts_with_super_admin() {
        let dataset = MockDataset::generate(&mut StdRng::seed_from_u64(1));
        assert_eq!(dataset.users.len(), 40);
        assert!(dataset.users[0].is_admin());
        assert_eq!(dataset.statistics.total_users, 40);
        assert_eq!(dataset.statistics.total_transactions, 120);
    }

    #[tokio::test]
    async fn seeding_spans_several_batches() {
        let sizes = MockSizes {
            users: 9,
            properties: 0,
            transactions: 600,
            contracts: 0,
            messages: 0,
            partners: 0,
            activity_logs: 0,
        };
        let dataset = MockDataset::generate_with(&mut StdRng::seed_from_u64(2), sizes);
        let store = DocumentStore::in_memory();

        let written = seed_store(&store, &dataset).await.unwrap();

        assert_eq!(written, 610);
        let transactions = store.get_all_documents("transactions").await.unwrap();
        assert_eq!(transactions.len(), 600);
        let admin = store.collection::<User>().get("1").await.unwrap().unwrap();
        assert_eq!(admin.email, dataset.users[0].email);
    }
}
