use serde::{Deserialize, Serialize};
use thiserror::Error;

use crux_core::capability::{Capability, CapabilityContext, Operation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeolocationOperation {
    /// Current device position from the platform location service.
    GetPosition,
    /// Resolve a user-entered postcode to a coordinate.
    Geocode { postcode: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GeolocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("postcode not found: {postcode}")]
    PostcodeNotFound { postcode: String },
}

pub type GeolocationResult = Result<GeoPosition, GeolocationError>;

impl Operation for GeolocationOperation {
    type Output = GeolocationResult;
}

#[derive(Clone)]
pub struct Geolocation<Ev> {
    context: CapabilityContext<GeolocationOperation, Ev>,
}

impl<Ev> Capability<Ev> for Geolocation<Ev> {
    type Operation = GeolocationOperation;
    type MappedSelf<MappedEv> = Geolocation<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static,
    {
        Geolocation::new(self.context.map_event(f))
    }
}

impl<Ev> Geolocation<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<GeolocationOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn locate<F>(&self, make_event: F)
    where
        F: FnOnce(GeolocationResult) -> Ev + Send + 'static,
        Ev: Send,
    {
        self.request(GeolocationOperation::GetPosition, make_event);
    }

    pub fn geocode<F>(&self, postcode: impl Into<String>, make_event: F)
    where
        F: FnOnce(GeolocationResult) -> Ev + Send + 'static,
        Ev: Send,
    {
        self.request(
            GeolocationOperation::Geocode {
                postcode: postcode.into(),
            },
            make_event,
        );
    }

    fn request<F>(&self, operation: GeolocationOperation, make_event: F)
    where
        F: FnOnce(GeolocationResult) -> Ev + Send + 'static,
        Ev: Send,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let result = context.request_from_shell(operation).await;
            context.update_app(make_event(result));
        });
    }
}
