//! 运行监管：单次运行的取消令牌
//!
//! 每个 run 持有一个 CancellationToken，cancel(run_id) 时触发；执行器在每个挂起点检查。

use tokio_util::sync::CancellationToken;

/// 单次运行的生命周期句柄
#[derive(Debug, Clone, Default)]
pub struct RunSupervisor {
    cancel_token: CancellationToken,
}

impl RunSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 派生自父令牌：父令牌取消（如进程关闭）时该运行一并取消
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            cancel_token: parent.child_token(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_cancelled_with_parent() {
        let parent = CancellationToken::new();
        let supervisor = RunSupervisor::child_of(&parent);
        assert!(!supervisor.is_cancelled());
        parent.cancel();
        assert!(supervisor.is_cancelled());
    }

    #[test]
    fn test_cancel_does_not_touch_parent() {
        let parent = CancellationToken::new();
        let supervisor = RunSupervisor::child_of(&parent);
        supervisor.cancel();
        assert!(supervisor.cancel_token().is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
