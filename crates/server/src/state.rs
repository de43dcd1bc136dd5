use std::sync::Arc;

use fairshare_queue::Scheduler;

use crate::channels::ChannelRouter;

pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub channels: Arc<ChannelRouter>,
    /// Answer every client message with an ack/nack frame.
    pub reply_acks: bool,
}
