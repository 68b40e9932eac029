use std::sync::Arc;

use crate::config::Settings;
use crate::delivery::create_delivery_adapter;
use crate::dispatcher::{WorkerPool, WorkerPoolConfig};
use crate::queue::{Channel, ChannelQueue, JobStoreBackend};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn JobStoreBackend>,
    pub email_queue: Arc<ChannelQueue>,
    pub whatsapp_queue: Arc<ChannelQueue>,
    pub email_pool: Arc<WorkerPool>,
    pub whatsapp_pool: Arc<WorkerPool>,
}

impl AppState {
    pub fn new(settings: Settings, store: Arc<dyn JobStoreBackend>) -> Self {
        let email_queue = Arc::new(ChannelQueue::new(Channel::Email, store.clone()));
        let whatsapp_queue = Arc::new(ChannelQueue::new(Channel::Whatsapp, store.clone()));

        let email_pool = Arc::new(WorkerPool::new(
            email_queue.clone(),
            create_delivery_adapter(Channel::Email, &settings),
            WorkerPoolConfig::from_settings(Channel::Email, &settings),
        ));
        let whatsapp_pool = Arc::new(WorkerPool::new(
            whatsapp_queue.clone(),
            create_delivery_adapter(Channel::Whatsapp, &settings),
            WorkerPoolConfig::from_settings(Channel::Whatsapp, &settings),
        ));

        Self {
            settings: Arc::new(settings),
            store,
            email_queue,
            whatsapp_queue,
            email_pool,
            whatsapp_pool,
        }
    }

    pub fn queue_for(&self, channel: Channel) -> &Arc<ChannelQueue> {
        match channel {
            Channel::Email => &self.email_queue,
            Channel::Whatsapp => &self.whatsapp_queue,
        }
    }
}
