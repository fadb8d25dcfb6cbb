use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ViewKind {
    Containers,
    Projects,
    Images,
    Networks,
    Volumes,
    Log,
    Inspect,
    FileBrowser,
    FileContent,
    Top,
    Confirm,
    Help,
}

impl ViewKind {
    pub const ALL: [Self; 12] = [
        Self::Containers,
        Self::Projects,
        Self::Images,
        Self::Networks,
        Self::Volumes,
        Self::Log,
        Self::Inspect,
        Self::FileBrowser,
        Self::FileContent,
        Self::Top,
        Self::Confirm,
        Self::Help,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Containers => "containers",
            Self::Projects => "projects",
            Self::Images => "images",
            Self::Networks => "networks",
            Self::Volumes => "volumes",
            Self::Log => "logs",
            Self::Inspect => "inspect",
            Self::FileBrowser => "files",
            Self::FileContent => "file",
            Self::Top => "top",
            Self::Confirm => "confirm",
            Self::Help => "help",
        }
    }
}

impl Display for ViewKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Active view plus the history that leads back to the root.
///
/// The top of `history` is never equal to `active`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NavigationStack {
    active: ViewKind,
    history: Vec<ViewKind>,
}

impl Default for NavigationStack {
    fn default() -> Self {
        Self::new(ViewKind::Containers)
    }
}

impl NavigationStack {
    pub fn new(root: ViewKind) -> Self {
        Self {
            active: root,
            history: Vec::new(),
        }
    }

    pub fn active(&self) -> ViewKind {
        self.active
    }

    pub fn history(&self) -> &[ViewKind] {
        &self.history
    }

    pub fn previous(&self) -> Option<ViewKind> {
        self.history.last().copied()
    }

    /// Drill down: `view` becomes active and the old active view is pushed.
    /// Returns false when `view` is already active.
    pub fn switch(&mut self, view: ViewKind) -> bool {
        if view == self.active {
            return false;
        }
        self.history.push(self.active);
        self.active = view;
        true
    }

    /// Pops the history; a no-op at the root.
    pub fn back(&mut self) -> Option<ViewKind> {
        let previous = self.history.pop()?;
        self.active = previous;
        while self.history.last() == Some(&self.active) {
            self.history.pop();
        }
        Some(previous)
    }

    /// Lateral move that leaves history untouched.
    pub fn replace(&mut self, view: ViewKind) {
        self.active = view;
        while self.history.last() == Some(&self.active) {
            self.history.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NavigationStack, ViewKind};
    use proptest::prelude::*;

    #[test]
    fn starts_at_container_list_with_empty_history() {
        let nav = NavigationStack::default();
        assert_eq!(nav.active(), ViewKind::Containers);
        assert!(nav.history().is_empty());
    }

    #[test]
    fn back_at_root_is_noop() {
        let mut nav = NavigationStack::default();
        assert_eq!(nav.back(), None);
        assert_eq!(nav, NavigationStack::default());
    }

    #[test]
    fn switch_then_back_returns_to_previous() {
        let mut nav = NavigationStack::default();
        assert!(nav.switch(ViewKind::Log));
        assert_eq!(nav.history(), &[ViewKind::Containers]);
        assert_eq!(nav.back(), Some(ViewKind::Containers));
        assert_eq!(nav.active(), ViewKind::Containers);
    }

    #[test]
    fn switching_to_active_view_does_not_push() {
        let mut nav = NavigationStack::default();
        assert!(!nav.switch(ViewKind::Containers));
        assert!(nav.history().is_empty());
    }

    #[test]
    fn replace_keeps_history_and_drops_duplicate_top() {
        let mut nav = NavigationStack::default();
        nav.switch(ViewKind::Inspect);
        nav.replace(ViewKind::Images);
        assert_eq!(nav.active(), ViewKind::Images);
        assert_eq!(nav.history(), &[ViewKind::Containers]);

        nav.replace(ViewKind::Containers);
        assert_eq!(nav.active(), ViewKind::Containers);
        assert!(nav.history().is_empty());
    }

    fn arb_view() -> impl Strategy<Value = ViewKind> {
        (0usize..ViewKind::ALL.len()).prop_map(|index| ViewKind::ALL[index])
    }

    proptest! {
        #[test]
        fn n_switches_then_n_backs_returns_to_root(views in prop::collection::vec(arb_view(), 0..20)) {
            let mut nav = NavigationStack::default();
            let mut pushed = 0;
            for view in views {
                if nav.switch(view) {
                    pushed += 1;
                }
            }
            for _ in 0..pushed {
                nav.back();
            }
            prop_assert_eq!(nav.active(), ViewKind::Containers);
            prop_assert!(nav.history().is_empty());
        }

        #[test]
        fn top_of_history_never_equals_active(
            ops in prop::collection::vec((0u8..3, arb_view()), 0..40)
        ) {
            let mut nav = NavigationStack::default();
            for (op, view) in ops {
                match op {
                    0 => { nav.switch(view); }
                    1 => { nav.back(); }
                    _ => nav.replace(view),
                }
                prop_assert_ne!(nav.previous(), Some(nav.active()));
            }
        }
    }
}
