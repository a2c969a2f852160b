#![allow(dead_code)]

use proptest::prelude::*;

/// Strategy for unit names, deliberately drawn from a small pool so names repeat
pub fn unit_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["load_dim", "load_fact", "extract", "nightly"])
        .prop_map(str::to_string)
}

/// Strategy for a batch of unit names to register
pub fn unit_batch_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(unit_name_strategy(), 1..40)
}

/// Strategy for peer names differing only in case from a small pool
pub fn peer_name_strategy() -> impl Strategy<Value = String> {
    ("[a-c]", any::<bool>()).prop_map(|(name, upper)| {
        let name = format!("slave-{name}");
        if upper {
            name.to_uppercase()
        } else {
            name
        }
    })
}

/// Strategy for request paths, with and without prefix and trailing separator
pub fn request_path_strategy() -> impl Strategy<Value = (String, bool, bool)> {
    ("[a-j][a-zA-Z]{0,11}", any::<bool>(), any::<bool>())
}
