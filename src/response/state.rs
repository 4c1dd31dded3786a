/// Lifecycle of a [`Response`].
///
/// [`Response`]: super::Response
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResponseState {
    /// Status and headers may be changed.
    Created,
    /// On-starting callbacks ran, headers are read-only.
    Started,
    /// Body framing and keep-alive are decided.
    ComputedHeaders,
    /// The head has been handed to the listener.
    StartedSending,
    /// The final send completed.
    Closed,
}

/// Forward-only [`ResponseState`] holder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateMachine {
    current: ResponseState,
}

impl Default for ResponseState {
    #[inline]
    fn default() -> Self {
        Self::Created
    }
}

impl StateMachine {
    #[inline]
    pub const fn new() -> Self {
        Self { current: ResponseState::Created }
    }

    #[inline]
    pub const fn current(&self) -> ResponseState {
        self.current
    }

    /// Returns `true` if the current state is at or after `state`.
    #[inline]
    pub fn reached(&self, state: ResponseState) -> bool {
        self.current >= state
    }

    /// Move to a later state.
    pub fn advance(&mut self, to: ResponseState) -> Result<(), InvalidTransition> {
        if to <= self.current {
            return Err(InvalidTransition { from: self.current, to });
        }
        self.current = to;
        Ok(())
    }

    /// Return to [`ResponseState::Created`], only before the head was sent.
    pub fn reset(&mut self) -> Result<(), InvalidTransition> {
        if self.current >= ResponseState::StartedSending {
            return Err(InvalidTransition { from: self.current, to: ResponseState::Created });
        }
        self.current = ResponseState::Created;
        Ok(())
    }
}

/// A backward or repeated [`StateMachine`] transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ResponseState,
    pub to: ResponseState,
}

impl std::error::Error for InvalidTransition {}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid response transition from {:?} to {:?}", self.from, self.to)
    }
}
