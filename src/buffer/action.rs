//! Irreversible actions as command objects.

use anyhow::Result;
use serde_json::Value;

/// A unit of irreversible work, owned by whoever holds it until it runs.
///
/// Implementors move whatever state they need into themselves at
/// construction. `execute` consumes the command, so it can run at most once.
pub trait IrreversibleAction: Send {
    fn execute(self: Box<Self>) -> Result<Value>;

    /// Optional inspection payload for pending-commit listings.
    fn describe(&self) -> Option<Value> {
        None
    }
}

impl<F> IrreversibleAction for F
where
    F: FnOnce() -> Result<Value> + Send,
{
    fn execute(self: Box<Self>) -> Result<Value> {
        (*self)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Grant {
        user: String,
        role: String,
    }

    impl IrreversibleAction for Grant {
        fn execute(self: Box<Self>) -> Result<Value> {
            Ok(json!({"granted": self.role, "to": self.user}))
        }

        fn describe(&self) -> Option<Value> {
            Some(json!({"user": self.user, "role": self.role}))
        }
    }

    #[test]
    fn test_closure_action() {
        let name = String::from("artifact.tar");
        let action: Box<dyn IrreversibleAction> =
            Box::new(move || -> Result<Value> { Ok(json!({ "deployed": name })) });
        assert!(action.describe().is_none());
        assert_eq!(action.execute().unwrap()["deployed"], "artifact.tar");
    }

    #[test]
    fn test_command_object() {
        let action: Box<dyn IrreversibleAction> = Box::new(Grant {
            user: "ops".to_string(),
            role: "admin".to_string(),
        });
        assert_eq!(action.describe().unwrap()["role"], "admin");
        assert_eq!(action.execute().unwrap()["to"], "ops");
    }
}
