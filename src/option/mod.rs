// Copyright 2019 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Types related to interpreting and handling CoAP options.

use super::*;

/// The maximum size of a CoAP option value allowed by this library.
pub const MAX_OPTION_VALUE_SIZE: usize = 1034;

mod num;
pub use num::*;

mod key;
pub use key::*;

mod value;
pub use value::*;

/// An ordered collection of CoAP options.
///
/// Entries are kept sorted by option number at all times; repeated options
/// with the same number keep their insertion order, which makes them come
/// out on the wire consecutively with a delta of zero.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct Options {
    entries: Vec<(OptionNumber, Vec<u8>)>,
}

impl Options {
    /// Creates a new, empty option collection.
    pub fn new() -> Options {
        Options {
            entries: Vec::new(),
        }
    }

    /// Returns the number of options in this collection.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if this collection holds no options.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts an option from its raw value bytes, keeping the collection
    /// sorted.
    ///
    /// Fails with [`Error::OptionNotRepeatable`] if an instance of a
    /// non-repeatable option is already present, and with
    /// [`Error::InvalidArgument`] if the value violates the option's
    /// declared length bounds.
    pub fn insert_bytes(&mut self, number: OptionNumber, value: &[u8]) -> Result<(), Error> {
        let (min, max) = number.value_len_bounds();
        if value.len() < min || value.len() > max || value.len() > MAX_OPTION_VALUE_SIZE {
            return Err(Error::InvalidArgument);
        }

        // Upper bound: past any equal-numbered entries, so repeats keep
        // their insertion order.
        let at = self
            .entries
            .iter()
            .position(|(n, _)| *n > number)
            .unwrap_or_else(|| self.entries.len());

        if !number.is_repeatable() && at > 0 && self.entries[at - 1].0 == number {
            return Err(Error::OptionNotRepeatable);
        }

        self.entries.insert(at, (number, value.to_vec()));
        Ok(())
    }

    /// Inserts a typed option value.
    pub fn insert<'a, T>(&mut self, key: OptionKey<T>, value: T) -> Result<(), Error>
    where
        T: Into<OptionValue<'a>>,
    {
        let mut scratch = [0u8; 8];
        let encoded = value.into().encode_into(&mut scratch);
        self.insert_bytes(key.0, encoded)
    }

    /// Replaces all instances of the given option with a single new value.
    pub fn replace<'a, T>(&mut self, key: OptionKey<T>, value: T) -> Result<(), Error>
    where
        T: Into<OptionValue<'a>>,
    {
        self.remove(key.0);
        self.insert(key, value)
    }

    /// Removes every instance of the given option number, returning true if
    /// anything was removed.
    pub fn remove(&mut self, number: OptionNumber) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| *n != number);
        before != self.entries.len()
    }

    /// Returns the raw value of the first instance of the given option.
    pub fn get_first(&self, number: OptionNumber) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, v)| v.as_slice())
    }

    /// Returns the decoded value of the first instance of the given typed
    /// option key. A present-but-undecodable value comes back as `None`.
    pub fn get<'a, T>(&'a self, key: OptionKey<T>) -> Option<T>
    where
        T: TryOptionValueFrom<'a> + Sized,
    {
        T::try_option_value_from(self.get_first(key.0)?)
    }

    /// Returns true if at least one instance of the given option is present.
    pub fn contains(&self, number: OptionNumber) -> bool {
        self.get_first(number).is_some()
    }

    /// Iterates over all instances of the given typed option key, in order.
    pub fn get_all<'a, T>(&'a self, key: OptionKey<T>) -> impl Iterator<Item = T> + 'a
    where
        T: TryOptionValueFrom<'a> + Sized + 'a,
    {
        self.entries
            .iter()
            .filter(move |(n, _)| *n == key.0)
            .filter_map(|(_, v)| T::try_option_value_from(v.as_slice()))
    }

    /// Iterates over `(number, value)` pairs in ascending number order.
    pub fn iter(&self) -> impl Iterator<Item = (OptionNumber, &[u8])> {
        self.entries.iter().map(|(n, v)| (*n, v.as_slice()))
    }

    /// Returns the number of the first critical option this library does not
    /// recognize, if any. Such a message must be rejected rather than
    /// processed.
    pub fn first_unrecognized_critical(&self) -> Option<OptionNumber> {
        self.entries
            .iter()
            .map(|(n, _)| *n)
            .find(|n| n.is_critical() && n.static_name().is_none())
    }
}
