// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod changes;
pub mod delivery;
pub mod fare;
pub mod google_oidc;
pub mod lifecycle;
pub mod notifications;
pub mod providers;
pub mod retry;
pub mod sweep;
pub mod tasks;

pub use changes::{ChangePublisher, ChannelPublisher, PublishError};
pub use delivery::{DeliveryChannel, DeliveryError, LogDelivery, PushGateway};
pub use fare::{FareAssessment, FareEngine, FareError, FareQuote, FareRequest, FareVerdict};
pub use google_oidc::{GoogleOidcVerifier, OidcError};
pub use lifecycle::{Actor, LifecycleError, LifecycleManager, ListingDraft, SweepReport};
pub use notifications::{CoordinatorHandle, DispatchReport, NotificationCoordinator};
pub use providers::{HaversineRoutes, RouteProvider, StaticWeather, WeatherProvider};
pub use retry::RetryConfig;
pub use sweep::{ExpirySweeper, SweeperHandle};
pub use tasks::TasksService;
