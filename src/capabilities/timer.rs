use serde::{Deserialize, Serialize};

use crux_core::capability::{Capability, CapabilityContext, Operation};

/// Identifies which recurring task a delay belongs to, so shells can label
/// or coalesce them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerId {
    PositionRefresh,
    ClockTick,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerOperation {
    NotifyAfter { id: TimerId, millis: u64 },
}

/// The shell reports the wall-clock time at which the delay elapsed; the
/// core never reads the system clock itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerOutput {
    pub now_ms: u64,
}

impl Operation for TimerOperation {
    type Output = TimerOutput;
}

/// One-shot delays. The core turns these into recurring tasks by re-arming
/// on each tick; stopping is handled in the app by orphaning stale ticks
/// with a generation counter, so no shell-side cancellation is needed.
#[derive(Clone)]
pub struct Timer<Ev> {
    context: CapabilityContext<TimerOperation, Ev>,
}

impl<Ev> Capability<Ev> for Timer<Ev> {
    type Operation = TimerOperation;
    type MappedSelf<MappedEv> = Timer<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static,
    {
        Timer::new(self.context.map_event(f))
    }
}

impl<Ev> Timer<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<TimerOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn notify_after<F>(&self, id: TimerId, millis: u64, make_event: F)
    where
        F: FnOnce(TimerOutput) -> Ev + Send + 'static,
        Ev: Send,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let output = context
                .request_from_shell(TimerOperation::NotifyAfter { id, millis })
                .await;
            context.update_app(make_event(output));
        });
    }
}
