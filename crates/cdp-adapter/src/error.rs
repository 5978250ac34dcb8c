use action_primitives::ActionError;
use chromiumoxide::error::CdpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("browser config error: {0}")]
    Config(String),
    #[error("failed to launch chromium: {0}")]
    Launch(String),
    #[error("browser is not open")]
    NotOpen,
    #[error(transparent)]
    Cdp(#[from] CdpError),
}

impl AdapterError {
    /// Whether the browser connection itself is gone.
    pub fn is_disconnect(&self) -> bool {
        match self {
            AdapterError::NotOpen | AdapterError::Launch(_) => true,
            AdapterError::Cdp(err) => is_disconnect(err),
            AdapterError::Config(_) => false,
        }
    }
}

fn is_disconnect(err: &CdpError) -> bool {
    matches!(
        err,
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse
    )
}

impl From<AdapterError> for ActionError {
    fn from(err: AdapterError) -> Self {
        if err.is_disconnect() {
            return ActionError::SessionLost(err.to_string());
        }
        match err {
            AdapterError::Cdp(CdpError::Timeout) => ActionError::Timeout(err.to_string()),
            AdapterError::Config(msg) => ActionError::InvalidArgument(msg),
            other => ActionError::Internal(other.to_string()),
        }
    }
}

pub(crate) fn cdp(err: CdpError) -> ActionError {
    AdapterError::Cdp(err).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnects_map_to_session_lost() {
        assert!(ActionError::from(AdapterError::NotOpen).is_fatal());
        assert!(ActionError::from(AdapterError::Cdp(CdpError::NoResponse)).is_fatal());
    }

    #[test]
    fn timeouts_stay_recoverable() {
        let err = ActionError::from(AdapterError::Cdp(CdpError::Timeout));
        assert!(matches!(err, ActionError::Timeout(_)));
        assert!(!err.is_fatal());
    }
}
