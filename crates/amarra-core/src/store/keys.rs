//! Key naming for the coordination structures.
//!
//! Every key is prefixed with a configurable namespace so multiple engines
//! can share one store. Per-topic structures nest under `topic:{name}`;
//! the delay and claims sorted sets are global (they span topics).

/// Ready list: messages available for immediate consumption on a topic.
pub fn ready(namespace: &str, topic: &str) -> String {
    format!("{namespace}:topic:{topic}:ready")
}

/// Processing list: messages claimed by a worker but not yet acknowledged.
pub fn processing(namespace: &str, topic: &str) -> String {
    format!("{namespace}:topic:{topic}:processing")
}

/// Dead-letter list: messages that exhausted their retry budget.
pub fn dead_letter(namespace: &str, topic: &str) -> String {
    format!("{namespace}:topic:{topic}:dead")
}

/// Global delay sorted set, scored by target delivery time (epoch seconds).
pub fn delayed(namespace: &str) -> String {
    format!("{namespace}:delayed")
}

/// Global claims sorted set, scored by claim deadline (epoch seconds).
/// Entries that outlive their deadline are swept back to the ready list.
pub fn claims(namespace: &str) -> String {
    format!("{namespace}:claims")
}

/// Lock key for the distributed lock / lease mutex.
pub fn lock(namespace: &str, name: &str) -> String {
    format!("{namespace}:lock:{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_keys_share_a_topic_prefix() {
        let r = ready("ns", "orders");
        let p = processing("ns", "orders");
        let d = dead_letter("ns", "orders");
        for key in [&r, &p, &d] {
            assert!(key.starts_with("ns:topic:orders:"));
        }
        assert_ne!(r, p);
        assert_ne!(p, d);
    }

    #[test]
    fn namespaces_do_not_collide() {
        assert_ne!(ready("a", "t"), ready("b", "t"));
        assert_ne!(delayed("a"), delayed("b"));
        assert_ne!(lock("a", "k"), lock("b", "k"));
    }

    #[test]
    fn global_sets_are_topic_independent() {
        assert_eq!(delayed("ns"), "ns:delayed");
        assert_eq!(claims("ns"), "ns:claims");
    }

    #[test]
    fn lock_keys_are_scoped() {
        assert_eq!(lock("ns", "migration"), "ns:lock:migration");
        assert_ne!(lock("ns", "a"), lock("ns", "b"));
    }
}
