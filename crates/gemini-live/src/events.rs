//! Consumer notifications.
//!
//! The socket task never calls the consumer directly: it queues a
//! [`LiveEvent`] and a dispatcher task delivers it to the [`EventHandler`],
//! so a slow consumer cannot stall inbound processing.

use crate::risk::RiskAssessment;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    Connected,
    Disconnected,
    RiskAnalysis(RiskAssessment),
    Error(String),
}

/// The consumer's view of a session.
#[cfg_attr(test, mockall::automock)]
pub trait EventHandler: Send + Sync {
    fn on_connected(&self);
    fn on_disconnect(&self);
    fn on_risk_analysis(&self, risk_level: i32, reason: String);
    fn on_error(&self, message: String);
}

/// Forwards every notification as a [`LiveEvent`] on the channel.
impl EventHandler for mpsc::UnboundedSender<LiveEvent> {
    fn on_connected(&self) {
        let _ = self.send(LiveEvent::Connected);
    }

    fn on_disconnect(&self) {
        let _ = self.send(LiveEvent::Disconnected);
    }

    fn on_risk_analysis(&self, risk_level: i32, reason: String) {
        let _ = self.send(LiveEvent::RiskAnalysis(RiskAssessment { risk_level, reason }));
    }

    fn on_error(&self, message: String) {
        let _ = self.send(LiveEvent::Error(message));
    }
}

pub(crate) fn dispatch(handler: &dyn EventHandler, event: LiveEvent) {
    match event {
        LiveEvent::Connected => handler.on_connected(),
        LiveEvent::Disconnected => handler.on_disconnect(),
        LiveEvent::RiskAnalysis(assessment) => {
            handler.on_risk_analysis(assessment.risk_level, assessment.reason)
        }
        LiveEvent::Error(message) => handler.on_error(message),
    }
}

/// Delivers queued events in order until every sender is dropped.
pub(crate) fn spawn_dispatcher(
    handler: Arc<dyn EventHandler>,
    mut events: mpsc::UnboundedReceiver<LiveEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            dispatch(handler.as_ref(), event);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::{Sequence, predicate::eq};

    #[tokio::test]
    async fn test_dispatcher_delivers_in_order() {
        let mut handler = MockEventHandler::new();
        let mut seq = Sequence::new();
        handler
            .expect_on_connected()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        handler
            .expect_on_risk_analysis()
            .with(eq(92), eq("Threat detected".to_string()))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        handler
            .expect_on_error()
            .with(eq("connection reset".to_string()))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        handler
            .expect_on_disconnect()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = spawn_dispatcher(Arc::new(handler), rx);
        tx.send(LiveEvent::Connected).unwrap();
        tx.send(LiveEvent::RiskAnalysis(RiskAssessment {
            risk_level: 92,
            reason: "Threat detected".to_string(),
        }))
        .unwrap();
        tx.send(LiveEvent::Error("connection reset".to_string())).unwrap();
        tx.send(LiveEvent::Disconnected).unwrap();
        drop(tx);

        dispatcher.await.unwrap();
    }

    #[test]
    fn test_channel_handler_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.on_connected();
        tx.on_risk_analysis(10, "fine".to_string());
        tx.on_error("boom".to_string());
        tx.on_disconnect();

        assert_eq!(rx.try_recv().unwrap(), LiveEvent::Connected);
        assert_eq!(
            rx.try_recv().unwrap(),
            LiveEvent::RiskAnalysis(RiskAssessment {
                risk_level: 10,
                reason: "fine".to_string()
            })
        );
        assert_eq!(rx.try_recv().unwrap(), LiveEvent::Error("boom".to_string()));
        assert_eq!(rx.try_recv().unwrap(), LiveEvent::Disconnected);
    }
}
