use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Number of low bits reserved for the [`Status`] tag.
const STATUS_BITS: u32 = 2;

/// Mask selecting the status tag of a [`LockState`].
const STATUS_MASK: u32 = (1 << STATUS_BITS) - 1;

/// Amount added to the raw word to advance the generation by one.
const GENERATION_STEP: u32 = 1 << STATUS_BITS;

/// Resolution status carried in the low bits of a [`LockState`].
///
/// `Pending` is zero on purpose: for a waiter it means "unresolved", and for
/// the mutex's own word it means "free", so a default word is an unlocked
/// mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// Unresolved waiter, or a free mutex.
    Pending = 0,
    /// The lock was granted.
    Success = 1,
    /// The attempt was canceled before the lock was granted.
    Canceled = 2,
    /// The attempt ran out of time before the lock was granted.
    Timeout = 3,
}

impl Status {
    fn from_bits(bits: u32) -> Self {
        match bits & STATUS_MASK {
            0 => Status::Pending,
            1 => Status::Success,
            2 => Status::Canceled,
            _ => Status::Timeout,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Pending => "pending",
            Status::Success => "success",
            Status::Canceled => "canceled",
            Status::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// A packed lock-state word: a 2-bit [`Status`] and a 30-bit generation.
///
/// The generation only moves forward when a fresh `Success` word is minted
/// by [`next_success`](Self::next_success). Releases are validated against
/// the exact word that was handed out, so a stale word from an earlier
/// ownership never matches the current one. The generation wraps around;
/// only exact equality matters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LockState(u32);

impl LockState {
    /// The free / unresolved word with generation zero.
    pub const PENDING: LockState = LockState(0);

    /// Builds a word from its raw representation.
    pub const fn from_raw(raw: u32) -> Self {
        LockState(raw)
    }

    /// Builds a word from a status and a generation.
    ///
    /// Generation bits above the 30 available ones are discarded.
    pub const fn new(status: Status, generation: u32) -> Self {
        LockState((generation << STATUS_BITS) | status as u32)
    }

    /// Returns the raw representation.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the status tag.
    pub fn status(self) -> Status {
        Status::from_bits(self.0)
    }

    /// Returns the generation counter.
    pub const fn generation(self) -> u32 {
        self.0 >> STATUS_BITS
    }

    /// Returns the same word with its status replaced.
    ///
    /// The generation is preserved.
    pub const fn with_status(self, status: Status) -> Self {
        LockState((self.0 & !STATUS_MASK) | status as u32)
    }

    /// Mints the next `Success` word.
    ///
    /// The generation is incremented regardless of the current status.
    pub const fn next_success(self) -> Self {
        LockState((self.0 & !STATUS_MASK).wrapping_add(GENERATION_STEP) | Status::Success as u32)
    }

    /// Returns `true` for every status except `Pending`.
    pub fn is_terminal(self) -> bool {
        self.status() != Status::Pending
    }

    /// Returns `true` only for `Success`.
    pub fn is_success(self) -> bool {
        self.status() == Status::Success
    }
}

impl fmt::Debug for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockState")
            .field("status", &self.status())
            .field("generation", &self.generation())
            .finish()
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.status(), self.generation())
    }
}

/// An atomic [`LockState`] cell mutated only through compare-and-swap.
///
/// Sequentially consistent throughout: the mutex pairs this word with its
/// queue counter, and each side must observe the other's last write.
pub(crate) struct AtomicLockState(AtomicU32);

impl AtomicLockState {
    pub(crate) const fn new(state: LockState) -> Self {
        Self(AtomicU32::new(state.0))
    }

    pub(crate) fn load(&self) -> LockState {
        LockState(self.0.load(Ordering::SeqCst))
    }

    /// Overwrites the word. Only valid while nobody else can observe it.
    pub(crate) fn store(&self, state: LockState) {
        self.0.store(state.0, Ordering::SeqCst);
    }

    pub(crate) fn compare_exchange(
        &self,
        current: LockState,
        new: LockState,
    ) -> Result<LockState, LockState> {
        self.0
            .compare_exchange(current.0, new.0, Ordering::SeqCst, Ordering::SeqCst)
            .map(LockState)
            .map_err(LockState)
    }

    /// Moves a free word to a freshly minted `Success` word.
    ///
    /// Retries while the word stays free; gives up as soon as it is taken.
    pub(crate) fn try_take(&self) -> Option<LockState> {
        let mut current = self.load();

        loop {
            if current.is_terminal() {
                return None;
            }

            let granted = current.next_success();
            match self.compare_exchange(current, granted) {
                Ok(_) => return Some(granted),
                Err(actual) => current = actual,
            }
        }
    }

    /// Moves `held` back to free, keeping its generation.
    ///
    /// Fails with the current word if `held` is not it.
    pub(crate) fn try_release(&self, held: LockState) -> Result<(), LockState> {
        self.compare_exchange(held, held.with_status(Status::Pending))
            .map(|_| ())
    }

    /// Resolves an unresolved word to `outcome`.
    ///
    /// Succeeds only if the cell still holds exactly `expected`, which must
    /// be a `Pending` word. Exactly one resolver wins.
    pub(crate) fn try_resolve(&self, expected: LockState, outcome: LockState) -> bool {
        debug_assert!(!expected.is_terminal());
        debug_assert!(outcome.is_terminal());

        self.compare_exchange(expected, outcome).is_ok()
    }
}

impl fmt::Debug for AtomicLockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [Status; 4] = [
        Status::Pending,
        Status::Success,
        Status::Canceled,
        Status::Timeout,
    ];

    fn any_status() -> impl Strategy<Value = Status> {
        prop::sample::select(ALL.to_vec())
    }

    proptest! {
        #[test]
        fn with_status_round_trips_and_keeps_generation(raw in any::<u32>(), status in any_status()) {
            let word = LockState::from_raw(raw);
            let encoded = word.with_status(status);

            prop_assert_eq!(encoded.status(), status);
            prop_assert_eq!(encoded.generation(), word.generation());
        }

        #[test]
        fn next_success_always_advances(raw in any::<u32>()) {
            let word = LockState::from_raw(raw);
            let next = word.next_success();

            prop_assert!(next.is_success());
            prop_assert_eq!(next.generation(), word.generation().wrapping_add(1) & (u32::MAX >> STATUS_BITS));
            prop_assert_ne!(next, word);
        }
    }

    #[test]
    fn pending_is_the_default_word() {
        assert_eq!(LockState::default(), LockState::PENDING);
        assert_eq!(LockState::default().status(), Status::Pending);
        assert!(!LockState::default().is_terminal());
    }

    #[test]
    fn terminal_and_success_classification() {
        for status in ALL {
            let word = LockState::new(status, 7);
            assert_eq!(word.is_terminal(), status != Status::Pending);
            assert_eq!(word.is_success(), status == Status::Success);
        }
    }

    #[test]
    fn generation_wraps_without_breaking_matching() {
        let last = LockState::new(Status::Success, u32::MAX >> STATUS_BITS);
        let wrapped = last.with_status(Status::Pending).next_success();

        assert_eq!(wrapped.generation(), 0);
        assert!(wrapped.is_success());
        assert_ne!(wrapped, last);

        let cell = AtomicLockState::new(wrapped);
        assert_eq!(cell.try_release(last), Err(wrapped));
        assert_eq!(cell.try_release(wrapped), Ok(()));
    }

    #[test]
    fn take_release_cycle() {
        let cell = AtomicLockState::new(LockState::PENDING);

        let first = cell.try_take().expect("free word must be taken");
        assert!(cell.try_take().is_none());

        cell.try_release(first).unwrap();
        let second = cell.try_take().unwrap();

        assert_eq!(second.generation(), first.generation() + 1);
        assert!(cell.try_release(first).is_err());
    }

    #[test]
    fn resolve_has_a_single_winner() {
        let cell = AtomicLockState::new(LockState::PENDING);
        let granted = LockState::PENDING.next_success();

        assert!(cell.try_resolve(LockState::PENDING, LockState::PENDING.with_status(Status::Canceled)));
        assert!(!cell.try_resolve(LockState::PENDING, granted));
        assert_eq!(cell.load().status(), Status::Canceled);
    }
}
