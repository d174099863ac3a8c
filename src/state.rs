use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::BookingStore;
use crate::services::booking::BookingService;
use crate::services::clock::Clock;
use crate::services::notify::Notifier;
use crate::services::slots::SlotGenerator;
use crate::services::time::TimeService;

pub struct AppState {
    pub config: AppConfig,
    pub bookings: BookingService,
    pub notifier: Box<dyn Notifier>,
}

impl AppState {
    /// Wires the engine from explicit parts; nothing is read from globals.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn BookingStore>,
        clock: Arc<dyn Clock>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let time = Arc::new(TimeService::new(&config.schedule.session, clock));
        let slots = Arc::new(SlotGenerator::new(config.schedule.clone(), time));
        Self {
            bookings: BookingService::new(store, slots),
            config,
            notifier,
        }
    }
}
