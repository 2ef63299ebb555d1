//! Interactive menu as an explicit state machine.
//!
//! [`transition`] is the whole menu: a state plus a choice gives the next
//! state and, possibly, an action for the caller to carry out. [`Menu`] only
//! offers [`options`] through a [`Selector`] and maps the picked index to a
//! choice, so the menu logic can be exercised by feeding choices to [`drive`].

use anyhow::Result;
use dialoguer::Select;

use crate::models::{Network, RunTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    Main,
    Settings,
    Network,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Start,
    Reset,
    Sync,
    OpenSettings,
    Quit,
    ToggleBackend,
    ToggleFrontend,
    ToggleSyncProtocol,
    ToggleVerboseLogging,
    ToggleAdvancedEngine,
    EditCredentials,
    OpenNetwork,
    PickNetwork(Network),
    Back,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Start,
    Reset,
    TriggerSync,
    ToggleRun(RunTarget),
    ToggleSyncProtocol,
    ToggleVerboseLogging,
    ToggleAdvancedEngine,
    EditCredentials,
    SetNetwork(Network),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: MenuState,
    pub action: Option<MenuAction>,
}

impl Transition {
    fn to(next: MenuState) -> Self {
        Self { next, action: None }
    }

    fn with(next: MenuState, action: MenuAction) -> Self {
        Self {
            next,
            action: Some(action),
        }
    }
}

/// The transition table. Choices that do not belong to `state` leave it as is.
pub fn transition(state: MenuState, choice: MenuChoice) -> Transition {
    use MenuChoice as C;
    use MenuState as S;

    match (state, choice) {
        (S::Main, C::Start) => Transition::with(S::Done, MenuAction::Start),
        (S::Main, C::Reset) => Transition::with(S::Main, MenuAction::Reset),
        (S::Main, C::Sync) => Transition::with(S::Main, MenuAction::TriggerSync),
        (S::Main, C::OpenSettings) => Transition::to(S::Settings),
        (S::Main, C::Quit) => Transition::to(S::Done),

        (S::Settings, C::ToggleBackend) => {
            Transition::with(S::Settings, MenuAction::ToggleRun(RunTarget::Backend))
        }
        (S::Settings, C::ToggleFrontend) => {
            Transition::with(S::Settings, MenuAction::ToggleRun(RunTarget::Frontend))
        }
        (S::Settings, C::ToggleSyncProtocol) => {
            Transition::with(S::Settings, MenuAction::ToggleSyncProtocol)
        }
        (S::Settings, C::ToggleVerboseLogging) => {
            Transition::with(S::Settings, MenuAction::ToggleVerboseLogging)
        }
        (S::Settings, C::ToggleAdvancedEngine) => {
            Transition::with(S::Settings, MenuAction::ToggleAdvancedEngine)
        }
        (S::Settings, C::EditCredentials) => {
            Transition::with(S::Settings, MenuAction::EditCredentials)
        }
        (S::Settings, C::OpenNetwork) => Transition::to(S::Network),
        (S::Settings, C::Back) => Transition::to(S::Main),

        (S::Network, C::PickNetwork(network)) => {
            Transition::with(S::Settings, MenuAction::SetNetwork(network))
        }
        (S::Network, C::Back) => Transition::to(S::Settings),

        (state, _) => Transition::to(state),
    }
}

/// Choices offered in `state`, in display order.
pub fn options(state: MenuState) -> Vec<(&'static str, MenuChoice)> {
    use MenuChoice as C;

    match state {
        MenuState::Main => vec![
            ("Start environment", C::Start),
            ("Reset local data", C::Reset),
            ("Trigger sync", C::Sync),
            ("Settings", C::OpenSettings),
            ("Quit", C::Quit),
        ],
        MenuState::Settings => vec![
            ("Toggle backend", C::ToggleBackend),
            ("Toggle frontend", C::ToggleFrontend),
            ("Toggle sync protocol", C::ToggleSyncProtocol),
            ("Toggle verbose logging", C::ToggleVerboseLogging),
            ("Toggle advanced engine parameters", C::ToggleAdvancedEngine),
            ("Edit credentials", C::EditCredentials),
            ("Select network", C::OpenNetwork),
            ("Back", C::Back),
        ],
        MenuState::Network => Network::ALL
            .iter()
            .map(|n| (n.as_str(), C::PickNetwork(*n)))
            .chain(std::iter::once(("Back", C::Back)))
            .collect(),
        MenuState::Done => Vec::new(),
    }
}

/// Feed `choices` through the table starting at `Main`, stopping at `Done`.
///
/// Returns the final state and every action produced on the way.
pub fn drive(choices: impl IntoIterator<Item = MenuChoice>) -> (MenuState, Vec<MenuAction>) {
    let mut state = MenuState::Main;
    let mut actions = Vec::new();
    for choice in choices {
        if state == MenuState::Done {
            break;
        }
        let step = transition(state, choice);
        state = step.next;
        actions.extend(step.action);
    }
    (state, actions)
}

/// Picks one item from a list.
pub trait Selector {
    /// Index into `items`, or `None` when the operator backs out.
    fn select(&mut self, title: &str, items: &[&str]) -> Result<Option<usize>>;
}

/// [`Selector`] on the controlling terminal. Esc or `q` backs out.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalSelector;

impl Selector for TerminalSelector {
    fn select(&mut self, title: &str, items: &[&str]) -> Result<Option<usize>> {
        Ok(Select::new()
            .with_prompt(title)
            .items(items)
            .default(0)
            .interact_opt()?)
    }
}

fn title(state: MenuState) -> &'static str {
    match state {
        MenuState::Main => "devstack",
        MenuState::Settings => "Settings",
        MenuState::Network => "Network",
        MenuState::Done => "",
    }
}

/// Choice taken when the operator backs out of `state`.
fn back_out(state: MenuState) -> MenuChoice {
    match state {
        MenuState::Main => MenuChoice::Quit,
        _ => MenuChoice::Back,
    }
}

/// Runs [`transition`] on choices taken from a [`Selector`].
pub struct Menu<S> {
    state: MenuState,
    selector: S,
}

impl<S: Selector> Menu<S> {
    pub fn new(selector: S) -> Self {
        Self {
            state: MenuState::Main,
            selector,
        }
    }

    pub fn state(&self) -> MenuState {
        self.state
    }

    /// Select until a choice produces an action. `None` once the menu is done.
    pub fn next_action(&mut self) -> Result<Option<MenuAction>> {
        while self.state != MenuState::Done {
            let options = options(self.state);
            let labels: Vec<&str> = options.iter().map(|(label, _)| *label).collect();

            let choice = match self.selector.select(title(self.state), &labels)? {
                Some(i) => match options.get(i) {
                    Some((_, choice)) => *choice,
                    None => continue,
                },
                None => back_out(self.state),
            };

            let step = transition(self.state, choice);
            self.state = step.next;
            if step.action.is_some() {
                return Ok(step.action);
            }
        }
        Ok(None)
    }
}
