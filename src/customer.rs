// Customer records, keyed by a composite of identity document, phone number
// and year of birth. The key is also what gets written into occupied day
// slots of a room calendar.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::persistence::{PersistenceError, RecordStore};
use crate::status::{Durability, Outcome, Status, StatusCode};

pub const CUSTOMER_ENTITY: &str = "customer";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerKey(String);

impl CustomerKey {
    pub fn derive(id_doc_no: &str, phone_no: &str, year_dob: i32) -> Self {
        Self(format!("{}|{}|{}", id_doc_no, phone_no, year_dob))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CustomerKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CustomerKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for CustomerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug)]
pub enum CustomerError {
    #[error("Invalid customer field: {0}")]
    InvalidField(&'static str),

    #[error("Duplicate customer: {0}")]
    DuplicateCustomer(CustomerKey),

    #[error("Customer not found: {0}")]
    CustomerNotFound(CustomerKey),
}

impl StatusCode for CustomerError {
    fn status(&self) -> Status {
        match self {
            CustomerError::InvalidField(_) => Status::CustomerInvalidField,
            CustomerError::DuplicateCustomer(_) => Status::DuplicateCustomer,
            CustomerError::CustomerNotFound(_) => Status::CustomerNotFound,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub names: String,
    pub surname: String,
    pub id_doc_no: String,
    pub phone_no: String,
    pub year_dob: i32,
}

impl CustomerRecord {
    pub fn key(&self) -> CustomerKey {
        CustomerKey::derive(&self.id_doc_no, &self.phone_no, self.year_dob)
    }

    fn validate(&self) -> Result<(), CustomerError> {
        validate_name("names", &self.names)?;
        validate_name("surname", &self.surname)?;
        if self.id_doc_no.is_empty() || !self.id_doc_no.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(CustomerError::InvalidField("id_doc_no"));
        }
        if self.phone_no.is_empty() || !self.phone_no.chars().all(|c| c.is_ascii_digit()) {
            return Err(CustomerError::InvalidField("phone_no"));
        }
        if self.year_dob <= 0 {
            return Err(CustomerError::InvalidField("year_dob"));
        }
        Ok(())
    }
}

fn validate_name(field: &'static str, value: &str) -> Result<(), CustomerError> {
    if value.trim().is_empty() {
        Err(CustomerError::InvalidField(field))
    } else {
        Ok(())
    }
}

// Fields that may change after creation. The identity fields make up the key
// and are fixed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerPatch {
    pub names: Option<String>,
    pub surname: Option<String>,
}

// Existence lookup consumed by the reservation desk
pub trait CustomerLookup {
    fn display(&self, key: &CustomerKey) -> Result<CustomerRecord, CustomerError>;
}

pub struct CustomerRegistry<S: RecordStore> {
    store: Arc<S>,
    customers: BTreeMap<CustomerKey, CustomerRecord>,
}

impl<S: RecordStore> CustomerRegistry<S> {
    pub fn open(store: Arc<S>) -> Result<Self, PersistenceError> {
        let customers: BTreeMap<CustomerKey, CustomerRecord> = store.load(CUSTOMER_ENTITY)?;
        info!(count = customers.len(), "Loaded customer registry");
        Ok(Self { store, customers })
    }

    // Re-reads the backing store. Between reloads the cache does not see
    // writes made by other processes.
    pub fn reload(&mut self) -> Result<(), PersistenceError> {
        self.customers = self.store.load(CUSTOMER_ENTITY)?;
        debug!(count = self.customers.len(), "Reloaded customer registry");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &CustomerKey> {
        self.customers.keys()
    }

    pub fn create(&mut self, record: CustomerRecord) -> Outcome<CustomerKey, CustomerError> {
        if let Err(e) = record.validate() {
            return Outcome::rejected(e);
        }

        let key = record.key();
        if self.customers.contains_key(&key) {
            return Outcome::rejected(CustomerError::DuplicateCustomer(key));
        }

        self.customers.insert(key.clone(), record);
        info!(customer = %key, "Created customer");
        Outcome::new(Ok(key), self.persist())
    }

    pub fn delete(&mut self, key: &CustomerKey) -> Outcome<(), CustomerError> {
        if self.customers.remove(key).is_none() {
            return Outcome::rejected(CustomerError::CustomerNotFound(key.clone()));
        }
        info!(customer = %key, "Deleted customer");
        Outcome::new(Ok(()), self.persist())
    }

    pub fn modify(
        &mut self,
        key: &CustomerKey,
        patch: CustomerPatch,
    ) -> Outcome<CustomerRecord, CustomerError> {
        let Some(current) = self.customers.get(key) else {
            return Outcome::rejected(CustomerError::CustomerNotFound(key.clone()));
        };

        let mut updated = current.clone();
        if let Some(names) = patch.names {
            updated.names = names;
        }
        if let Some(surname) = patch.surname {
            updated.surname = surname;
        }
        if let Err(e) = updated.validate() {
            return Outcome::rejected(e);
        }
        if &updated == current {
            return Outcome::new(Ok(updated), Durability::NotAttempted);
        }

        self.customers.insert(key.clone(), updated.clone());
        info!(customer = %key, "Modified customer");
        Outcome::new(Ok(updated), self.persist())
    }

    fn persist(&self) -> Durability {
        let durability = Durability::from(self.store.update(CUSTOMER_ENTITY, &self.customers));
        if let Some(e) = durability.error() {
            warn!(error = %e, "Customer change applied in memory but not persisted");
        }
        durability
    }
}

impl<S: RecordStore> CustomerLookup for CustomerRegistry<S> {
    fn display(&self, key: &CustomerKey) -> Result<CustomerRecord, CustomerError> {
        self.customers
            .get(key)
            .cloned()
            .ok_or_else(|| CustomerError::CustomerNotFound(key.clone()))
    }
}
