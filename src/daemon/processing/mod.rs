use anyhow::Result;
use module::EventProcessor;
use tokio::sync::{broadcast, mpsc::Receiver};
use tracing::{debug, error, info};

use super::storage::entities::ActivityEntry;

pub mod daily_aggregator;
pub mod module;

const SUBSCRIBER_CAPACITY: usize = 64;

/// Represents the consumer of finalized entries. This module is responsible for receiving entries,
/// handing them to the processor, and publishing them to whoever subscribed.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<ActivityEntry>,
    processor: Processor,
    subscribers: broadcast::Sender<ActivityEntry>,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<ActivityEntry>, processor: P) -> Self {
        let (subscribers, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            receiver,
            processor,
            subscribers,
        }
    }

    /// Every entry processed from now on is delivered to the returned receiver. The stream ends
    /// once processing finishes.
    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEntry> {
        self.subscribers.subscribe()
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(entry) = self.receiver.recv().await {
            debug!("Processing entry {:?}", entry);
            match self.processor.process_next(entry.clone()).await {
                Ok(_) => {
                    info!("Processed entry {:?}", entry)
                }
                Err(e) => {
                    error!("Error processing entry {:?}: {e:?}", entry)
                }
            }
            // Nobody listening is fine.
            let _ = self.subscribers.send(entry);
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}
