use std::collections::VecDeque;

use anyhow::Result;
use devstack::menu::*;
use devstack::models::{Network, RunTarget};
use speculate2::speculate;

/// Answers selections from a fixed script; backs out once it runs dry.
struct ScriptedSelector {
    picks: VecDeque<Option<usize>>,
    titles: Vec<String>,
}

impl ScriptedSelector {
    fn new(picks: impl IntoIterator<Item = Option<usize>>) -> Self {
        Self {
            picks: picks.into_iter().collect(),
            titles: Vec::new(),
        }
    }
}

impl Selector for &mut ScriptedSelector {
    fn select(&mut self, title: &str, _items: &[&str]) -> Result<Option<usize>> {
        self.titles.push(title.to_string());
        Ok(self.picks.pop_front().flatten())
    }
}

speculate! {
    describe "transition table" {
        it "starts from main and ends on start" {
            let (state, actions) = drive([MenuChoice::Start]);
            assert_eq!(state, MenuState::Done);
            assert_eq!(actions, vec![MenuAction::Start]);
        }

        it "quits without actions" {
            let (state, actions) = drive([MenuChoice::Quit]);
            assert_eq!(state, MenuState::Done);
            assert!(actions.is_empty());
        }

        it "collects settings edits and returns to main" {
            let (state, actions) = drive([
                MenuChoice::OpenSettings,
                MenuChoice::ToggleFrontend,
                MenuChoice::ToggleSyncProtocol,
                MenuChoice::OpenNetwork,
                MenuChoice::PickNetwork(Network::Testnet),
                MenuChoice::Back,
            ]);
            assert_eq!(state, MenuState::Main);
            assert_eq!(actions, vec![
                MenuAction::ToggleRun(RunTarget::Frontend),
                MenuAction::ToggleSyncProtocol,
                MenuAction::SetNetwork(Network::Testnet),
            ]);
        }

        it "ignores choices that do not belong to the current state" {
            let step = transition(MenuState::Main, MenuChoice::ToggleBackend);
            assert_eq!(step.next, MenuState::Main);
            assert!(step.action.is_none());

            let step = transition(MenuState::Network, MenuChoice::Start);
            assert_eq!(step.next, MenuState::Network);
        }

        it "stops consuming choices once done" {
            let (state, actions) = drive([MenuChoice::Quit, MenuChoice::Start]);
            assert_eq!(state, MenuState::Done);
            assert!(actions.is_empty());
        }

        it "keeps reset and sync on the main menu" {
            let (state, actions) = drive([MenuChoice::Reset, MenuChoice::Sync]);
            assert_eq!(state, MenuState::Main);
            assert_eq!(actions, vec![MenuAction::Reset, MenuAction::TriggerSync]);
        }

        it "offers every option as a valid transition" {
            for state in [MenuState::Main, MenuState::Settings, MenuState::Network] {
                for (label, choice) in options(state) {
                    let step = transition(state, choice);
                    assert!(
                        step.next != state || step.action.is_some(),
                        "{} does nothing in {:?}", label, state
                    );
                }
            }
        }
    }

    describe "selector menu" {
        it "maps picked indexes to actions" {
            // Settings, then Toggle backend
            let mut selector = ScriptedSelector::new([Some(3), Some(0)]);
            let mut menu = Menu::new(&mut selector);
            assert_eq!(menu.next_action().unwrap(), Some(MenuAction::ToggleRun(RunTarget::Backend)));
            assert_eq!(menu.state(), MenuState::Settings);
            drop(menu);
            assert_eq!(selector.titles, vec!["devstack", "Settings"]);
        }

        it "ignores out of range picks" {
            let mut selector = ScriptedSelector::new([Some(99), Some(0)]);
            let mut menu = Menu::new(&mut selector);
            assert_eq!(menu.next_action().unwrap(), Some(MenuAction::Start));
            assert_eq!(menu.state(), MenuState::Done);
        }

        it "backs out of submenus and quits from main" {
            // Settings, Network, back out twice, back out of main
            let mut selector = ScriptedSelector::new([Some(3), Some(6), None, None, None]);
            let mut menu = Menu::new(&mut selector);
            assert_eq!(menu.next_action().unwrap(), None);
            assert_eq!(menu.state(), MenuState::Done);
            drop(menu);
            assert_eq!(selector.titles, vec!["devstack", "Settings", "Network", "Settings", "devstack"]);
        }

        it "picks a network from the list" {
            let mut selector = ScriptedSelector::new([Some(3), Some(6), Some(2)]);
            let mut menu = Menu::new(&mut selector);
            assert_eq!(menu.next_action().unwrap(), Some(MenuAction::SetNetwork(Network::Mainnet)));
            assert_eq!(menu.state(), MenuState::Settings);
        }
    }
}
