use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Source of single-use tokens.
///
/// A process-lifetime source must never hand out the same value twice;
/// the kernel relies on this for replay protection. [`ScriptedNonce`]
/// deliberately breaks the rule so the rejection path can be exercised.
pub trait NonceSource: Send + Sync {
    /// Produce a fresh token.
    fn generate(&self) -> String;
}

/// Deterministic `{prefix}{n}` tokens counting up from zero.
#[derive(Clone)]
pub struct SequenceNonce {
    prefix: String,
    next: Arc<AtomicU64>,
}

impl SequenceNonce {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of tokens handed out so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for SequenceNonce {
    fn default() -> Self {
        Self::new("n")
    }
}

impl NonceSource for SequenceNonce {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}{}", self.prefix, n)
    }
}

impl fmt::Debug for SequenceNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SequenceNonce({}*, issued={})", self.prefix, self.issued())
    }
}

/// Random UUID v7 tokens.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomNonce;

impl NonceSource for RandomNonce {
    fn generate(&self) -> String {
        uuid::Uuid::now_v7().simple().to_string()
    }
}

/// Hands out a fixed list of tokens in order, then keeps repeating the
/// last one (or the empty string if the list was empty).
#[derive(Clone)]
pub struct ScriptedNonce {
    queue: Arc<Mutex<(VecDeque<String>, String)>>,
}

impl ScriptedNonce {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue: VecDeque<String> = tokens.into_iter().map(Into::into).collect();
        Self {
            queue: Arc::new(Mutex::new((queue, String::new()))),
        }
    }
}

impl NonceSource for ScriptedNonce {
    fn generate(&self) -> String {
        let mut guard = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let (queue, last) = &mut *guard;
        if let Some(next) = queue.pop_front() {
            *last = next;
        }
        last.clone()
    }
}

impl fmt::Debug for ScriptedNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScriptedNonce")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn sequence_counts_up() {
        let nonces = SequenceNonce::new("n");
        assert_eq!(nonces.generate(), "n0");
        assert_eq!(nonces.generate(), "n1");
        assert_eq!(nonces.issued(), 2);
    }

    #[test]
    fn sequence_clones_share_counter() {
        let a = SequenceNonce::new("tx-");
        let b = a.clone();
        assert_eq!(a.generate(), "tx-0");
        assert_eq!(b.generate(), "tx-1");
    }

    #[test]
    fn random_nonces_are_unique() {
        let source = RandomNonce;
        let seen: HashSet<String> = (0..256).map(|_| source.generate()).collect();
        assert_eq!(seen.len(), 256);
    }

    #[test]
    fn scripted_repeats_last_value() {
        let source = ScriptedNonce::new(["a", "b"]);
        assert_eq!(source.generate(), "a");
        assert_eq!(source.generate(), "b");
        assert_eq!(source.generate(), "b");
    }

    #[test]
    fn scripted_empty_yields_empty_string() {
        let source = ScriptedNonce::new(Vec::<String>::new());
        assert_eq!(source.generate(), "");
    }
}
