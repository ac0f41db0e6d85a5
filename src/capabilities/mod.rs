mod geolocation;
mod timer;

pub use self::geolocation::{
    GeoPosition, Geolocation, GeolocationError, GeolocationOperation, GeolocationResult,
};
pub use self::timer::{Timer, TimerId, TimerOperation, TimerOutput};

// We use Crux's built-in Render capability directly because it provides
// all necessary functionality for triggering view updates.
pub use crux_core::render::Render;
pub use crux_http::Http;

use crate::app::App;
use crate::event::Event;

pub type AppHttp = Http<Event>;
pub type AppRender = Render<Event>;
pub type AppTimer = Timer<Event>;
pub type AppGeolocation = Geolocation<Event>;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub http: Http<Event>,
    pub timer: Timer<Event>,
    pub geolocation: Geolocation<Event>,
}
