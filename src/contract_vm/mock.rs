use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::ops::{Bound, RangeBounds};
use std::rc::Rc;
use std::vec::IntoIter;

use cosmwasm_std::{Order, KV};
use cosmwasm_vm::{BackendError, BackendResult, GasInfo, Storage};
use log::trace;

use crate::contract_vm::gas::SharedGasMeter;
use crate::error::{HarnessError, HarnessResult};

/// Flat cost of opening a range
const GAS_COST_RANGE: u64 = 11;
/// Cost of the step that finds a range exhausted
const GAS_COST_LAST_ITERATION: u64 = 37;

#[derive(Default, Debug)]
struct StorageState {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    iterators: HashMap<u32, IntoIter<KV>>,
    last_iterator_id: u32,
}

/// MockStorage is the ordered key-value store a contract sees as its persistent state.
///
/// Every operation charges the gas meter before touching the data; when the
/// meter refuses, the operation fails with the meter's out-of-gas error and
/// the data is left as it was.
///
/// The storage is clonable but clones access the same underlying data and the
/// same gas meter. The copy handed to a VM backend and the copy kept by the
/// caller therefore always agree.
#[derive(Clone, Debug)]
pub struct MockStorage {
    state: Rc<RefCell<StorageState>>,
    gas_meter: SharedGasMeter,
}

impl MockStorage {
    pub fn new(gas_meter: SharedGasMeter) -> Self {
        MockStorage {
            state: Rc::new(RefCell::new(StorageState::default())),
            gas_meter,
        }
    }

    pub fn gas_meter(&self) -> &SharedGasMeter {
        &self.gas_meter
    }

    pub fn get(&self, key: &[u8]) -> HarnessResult<Option<Vec<u8>>> {
        self.gas_meter.consume(key.len() as u64, "storage get")?;
        Ok(self.state.borrow().data.get(key).cloned())
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> HarnessResult<()> {
        self.gas_meter
            .consume((key.len() + value.len()) as u64, "storage set")?;
        self.state
            .borrow_mut()
            .data
            .insert(key.to_vec(), value.to_vec());
        trace!(
            target: "contract_vm::storage",
            "set {} = {}",
            base64::encode(key),
            base64::encode(value)
        );
        Ok(())
    }

    /// Removing a key that is not present is a no-op, but is still charged.
    pub fn delete(&self, key: &[u8]) -> HarnessResult<()> {
        self.gas_meter.consume(key.len() as u64, "storage delete")?;
        if self.state.borrow_mut().data.remove(key).is_some() {
            trace!(target: "contract_vm::storage", "removed {}", base64::encode(key));
        }
        Ok(())
    }

    /// Opens a range over `[start, end)` in the given order.
    ///
    /// The returned iterator works on a snapshot taken here: writes made
    /// after this call are not visible to it. Call `range` again to observe
    /// them.
    pub fn range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> HarnessResult<StorageIter> {
        self.gas_meter.consume(GAS_COST_RANGE, "storage range")?;
        Ok(StorageIter {
            items: self.snapshot(start, end, order).into_iter(),
            gas_meter: self.gas_meter.clone(),
            done: false,
        })
    }

    pub fn len(&self) -> usize {
        self.state.borrow().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().data.is_empty()
    }

    /// Number of iterators opened through the backend and not yet released.
    pub fn open_iterators(&self) -> usize {
        self.state.borrow().iterators.len()
    }

    /// Drops every backend iterator. Called when the contract call that
    /// opened them has finished; ids are not reused.
    pub fn release_iterators(&self) {
        let mut state = self.state.borrow_mut();
        if !state.iterators.is_empty() {
            trace!(
                target: "contract_vm::storage",
                "released {} iterators",
                state.iterators.len()
            );
            state.iterators.clear();
        }
    }

    /// All entries in ascending order, without charging gas.
    pub fn dump(&self) -> Vec<KV> {
        self.state
            .borrow()
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn snapshot(&self, start: Option<&[u8]>, end: Option<&[u8]>, order: Order) -> Vec<KV> {
        let bounds = range_bounds(start, end);
        let state = self.state.borrow();
        match (bounds.start_bound(), bounds.end_bound()) {
            // BTreeMap.range panics if range is start > end.
            // However, this cases represent just empty range and we treat it as such.
            (Bound::Included(start), Bound::Excluded(end)) if start > end => Vec::new(),
            _ => match order {
                Order::Ascending => state.data.range(bounds).map(clone_item).collect(),
                Order::Descending => state.data.range(bounds).rev().map(clone_item).collect(),
            },
        }
    }

    // charges for the item at the front of `items` before handing it out
    fn step(items: &mut IntoIter<KV>, gas_meter: &SharedGasMeter) -> HarnessResult<Option<KV>> {
        match items.as_slice().first() {
            Some((key, value)) => {
                gas_meter.consume((key.len() + value.len()) as u64, "storage next")?;
                Ok(items.next())
            }
            None => {
                gas_meter.consume(GAS_COST_LAST_ITERATION, "storage next")?;
                Ok(None)
            }
        }
    }
}

/// Metered iterator over a storage snapshot. Yields `Err` at most once, then ends.
#[derive(Debug)]
pub struct StorageIter {
    items: IntoIter<KV>,
    gas_meter: SharedGasMeter,
    done: bool,
}

impl Iterator for StorageIter {
    type Item = HarnessResult<KV>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match MockStorage::step(&mut self.items, &self.gas_meter) {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl Storage for MockStorage {
    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
        let gas_info = GasInfo::with_externally_used(key.len() as u64);
        (MockStorage::get(self, key).map_err(BackendError::from), gas_info)
    }

    fn scan(
        &mut self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> BackendResult<u32> {
        let gas_info = GasInfo::with_externally_used(GAS_COST_RANGE);
        if let Err(err) = self.gas_meter.consume(GAS_COST_RANGE, "storage scan") {
            return (Err(err.into()), gas_info);
        }

        let values = self.snapshot(start, end, order);
        let mut state = self.state.borrow_mut();
        state.last_iterator_id += 1;
        let new_id = state.last_iterator_id;
        state.iterators.insert(new_id, values.into_iter());
        trace!(target: "contract_vm::storage", "opened iterator {}", new_id);

        (Ok(new_id), gas_info)
    }

    fn next(&mut self, iterator_id: u32) -> BackendResult<Option<KV>> {
        let mut state = self.state.borrow_mut();
        let iterator = match state.iterators.get_mut(&iterator_id) {
            Some(i) => i,
            None => {
                return (
                    Err(BackendError::iterator_does_not_exist(iterator_id)),
                    GasInfo::free(),
                )
            }
        };

        let gas_info = match iterator.as_slice().first() {
            Some((key, value)) => GasInfo::with_externally_used((key.len() + value.len()) as u64),
            None => GasInfo::with_externally_used(GAS_COST_LAST_ITERATION),
        };
        let result = MockStorage::step(iterator, &self.gas_meter).map_err(BackendError::from);
        (result, gas_info)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> BackendResult<()> {
        let gas_info = GasInfo::with_externally_used((key.len() + value.len()) as u64);
        (MockStorage::set(self, key, value).map_err(BackendError::from), gas_info)
    }

    fn remove(&mut self, key: &[u8]) -> BackendResult<()> {
        let gas_info = GasInfo::with_externally_used(key.len() as u64);
        (MockStorage::delete(self, key).map_err(BackendError::from), gas_info)
    }
}

fn range_bounds(start: Option<&[u8]>, end: Option<&[u8]>) -> impl RangeBounds<Vec<u8>> {
    (
        start.map_or(Bound::Unbounded, |x| Bound::Included(x.to_vec())),
        end.map_or(Bound::Unbounded, |x| Bound::Excluded(x.to_vec())),
    )
}

/// The BTreeMap specific key-value pair reference type, as returned by BTreeMap<Vec<u8>, T>::range.
/// This is internal as it can change any time if the map implementation is swapped out.
type BTreeMapPairRef<'a, T = Vec<u8>> = (&'a Vec<u8>, &'a T);

fn clone_item<T: Clone>(item_ref: BTreeMapPairRef<T>) -> KV<T> {
    let (key, value) = item_ref;
    (key.clone(), value.clone())
}
