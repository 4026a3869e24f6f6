pub mod budget;
pub mod directory;
pub mod duration;
pub mod events;
pub mod itinerary;
pub mod provider;
pub mod repository;
pub mod session;

pub use budget::{BudgetPolicy, BudgetSnapshot, BudgetStanding};
pub use directory::{Attendee, Event, EventGroup, RoleSet};
pub use duration::{parse_duration_minutes, DurationError};
pub use events::{EventPublisher, PublishError};
pub use itinerary::{
    Airport, ApprovalStatus, DenialReason, Itinerary, ItineraryDetail, ItinerarySlice, NewItinerary,
    NewSegment, NewSlice, Segment, SliceDetail, Transition, TransitionError,
};
pub use provider::{FlightProvider, ProviderError};
pub use repository::{DirectoryRepository, ItineraryStore, ItineraryTx, StoreError};
pub use session::{SessionStoreError, TokenDenylist};
