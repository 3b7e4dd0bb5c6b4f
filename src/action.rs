/// Requests a consumer can make of a running collector.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    RequestSetup,
    CheckPermission,
    Stop,
}
