//! One-time capability check of the tertiary engine.

use std::fmt;

use crate::renderers::{DriveFn, TertiaryModule};

/// Static time-advance entry points, in priority order.
pub const ENTRY_POINTS: [&str; 2] = ["Tween.update", "reducers.update"];

/// Whether the tertiary engine can be forced to an explicit timestamp.
///
/// Computed once when the coordinator loads the module and never re-evaluated.
#[derive(Clone)]
pub enum Controllability {
    Controlled {
        entry_point: &'static str,
        drive: DriveFn,
    },
    Uncontrolled,
}

impl Controllability {
    /// Look up the first known entry point of `module`. A missing module is
    /// uncontrolled.
    pub fn detect(module: Option<&dyn TertiaryModule>) -> Self {
        let Some(module) = module else {
            return Controllability::Uncontrolled;
        };
        ENTRY_POINTS
            .iter()
            .find_map(|name| {
                module.entry_point(name).map(|drive| Controllability::Controlled {
                    entry_point: *name,
                    drive,
                })
            })
            .unwrap_or(Controllability::Uncontrolled)
    }

    pub fn is_controlled(&self) -> bool {
        matches!(self, Controllability::Controlled { .. })
    }

    pub fn drive_fn(&self) -> Option<&DriveFn> {
        match self {
            Controllability::Controlled { drive, .. } => Some(drive),
            Controllability::Uncontrolled => None,
        }
    }

    pub fn entry_point(&self) -> Option<&'static str> {
        match self {
            Controllability::Controlled { entry_point, .. } => Some(*entry_point),
            Controllability::Uncontrolled => None,
        }
    }
}

impl fmt::Debug for Controllability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Controllability::Controlled { entry_point, .. } => f
                .debug_struct("Controlled")
                .field("entry_point", entry_point)
                .finish_non_exhaustive(),
            Controllability::Uncontrolled => f.write_str("Uncontrolled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BurstOptions;
    use crate::renderers::NodeId;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Exports {
        names: Vec<&'static str>,
        calls: Rc<RefCell<Vec<(&'static str, f64)>>>,
    }

    impl TertiaryModule for Exports {
        fn entry_point(&self, name: &str) -> Option<DriveFn> {
            let name = *self.names.iter().find(|n| **n == name)?;
            let calls = self.calls.clone();
            Some(Rc::new(move |t| {
                calls.borrow_mut().push((name, t));
                Ok(())
            }))
        }
        fn burst(&self, _x: f64, _y: f64, _options: &BurstOptions) -> anyhow::Result<NodeId> {
            Ok(NodeId(1))
        }
        fn stop(&self, _node: NodeId) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn tween_update_wins_over_reducers() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let module = Exports {
            names: vec!["reducers.update", "Tween.update"],
            calls: calls.clone(),
        };
        let c = Controllability::detect(Some(&module));
        assert_eq!(c.entry_point(), Some("Tween.update"));
        (c.drive_fn().expect("drive"))(42.0).expect("drive ok");
        assert_eq!(*calls.borrow(), vec![("Tween.update", 42.0)]);
    }

    #[test]
    fn reducers_update_is_the_second_choice() {
        let module = Exports {
            names: vec!["reducers.update"],
            calls: Rc::default(),
        };
        let c = Controllability::detect(Some(&module));
        assert!(c.is_controlled());
        assert_eq!(c.entry_point(), Some("reducers.update"));
    }

    #[test]
    fn missing_module_or_entry_points_is_uncontrolled() {
        assert!(!Controllability::detect(None).is_controlled());
        let module = Exports {
            names: vec!["Timeline.update"],
            calls: Rc::default(),
        };
        let c = Controllability::detect(Some(&module));
        assert!(c.drive_fn().is_none());
        assert_eq!(format!("{c:?}"), "Uncontrolled");
    }
}
