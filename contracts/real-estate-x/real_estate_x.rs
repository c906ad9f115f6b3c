// Do not link against libstd (i.e. anything defined in `std::`)
#![no_std]

use miden::{component, felt, Felt, StorageMap, StorageMapAccess, Word};

/// Registry of properties and their owners.
///
/// Owners are identified by the prefix felt of their account id.
#[component]
struct RealEstateX {
    #[storage(slot(0), description = "property id to owner")]
    owners: StorageMap,
    #[storage(slot(1), description = "registry counters")]
    counters: StorageMap,
}

fn property_key(property_id: Felt) -> Word {
    Word::from([felt!(0), felt!(0), felt!(0), property_id])
}

fn count_key() -> Word {
    Word::from([felt!(0), felt!(0), felt!(0), felt!(0)])
}

#[component]
impl RealEstateX {
    /// Records `owner` for a new `property_id` and returns the number of registered properties.
    ///
    /// Owners must be non-zero, and a property can only be registered once.
    pub fn register_property(&self, property_id: Felt, owner: Felt) -> Felt {
        assert!(owner != felt!(0), "owner must be non-zero");

        let key = property_key(property_id);
        let previous: Felt = self.owners.get(&key);
        assert!(previous == felt!(0), "property already registered");
        self.owners.set(key, owner);

        let count: Felt = self.counters.get(&count_key());
        let count = count + felt!(1);
        self.counters.set(count_key(), count);
        count
    }

    /// Hands a registered property to `new_owner`.
    pub fn transfer_property(&self, property_id: Felt, new_owner: Felt) {
        assert!(new_owner != felt!(0), "new owner must be non-zero");

        let key = property_key(property_id);
        let current: Felt = self.owners.get(&key);
        assert!(current != felt!(0), "property not registered");
        self.owners.set(key, new_owner);
    }

    pub fn owner_of(&self, property_id: Felt) -> Felt {
        self.owners.get(&property_key(property_id))
    }

    pub fn property_count(&self) -> Felt {
        self.counters.get(&count_key())
    }
}
