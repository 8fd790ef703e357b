//! The enumerated pipeline points.

use serde::{Deserialize, Serialize};
use swarmloop_core::PipelineError;

/// A named hook in the turn/step lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelinePoint {
    #[serde(rename = "turn.pre")]
    TurnPre,
    #[serde(rename = "step.pre")]
    StepPre,
    #[serde(rename = "step.config")]
    StepConfig,
    #[serde(rename = "step.tools")]
    StepTools,
    #[serde(rename = "step.blocks")]
    StepBlocks,
    #[serde(rename = "step.llmCall")]
    StepLlmCall,
    #[serde(rename = "step.llmError")]
    StepLlmError,
    #[serde(rename = "toolCall.pre")]
    ToolCallPre,
    #[serde(rename = "toolCall.exec")]
    ToolCallExec,
    #[serde(rename = "toolCall.post")]
    ToolCallPost,
    #[serde(rename = "step.post")]
    StepPost,
    #[serde(rename = "turn.post")]
    TurnPost,
    #[serde(rename = "workspace.repoAvailable")]
    WorkspaceRepoAvailable,
    #[serde(rename = "workspace.worktreeMounted")]
    WorkspaceWorktreeMounted,
}

impl PipelinePoint {
    pub const ALL: [PipelinePoint; 14] = [
        PipelinePoint::TurnPre,
        PipelinePoint::StepPre,
        PipelinePoint::StepConfig,
        PipelinePoint::StepTools,
        PipelinePoint::StepBlocks,
        PipelinePoint::StepLlmCall,
        PipelinePoint::StepLlmError,
        PipelinePoint::ToolCallPre,
        PipelinePoint::ToolCallExec,
        PipelinePoint::ToolCallPost,
        PipelinePoint::StepPost,
        PipelinePoint::TurnPost,
        PipelinePoint::WorkspaceRepoAvailable,
        PipelinePoint::WorkspaceWorktreeMounted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePoint::TurnPre => "turn.pre",
            PipelinePoint::StepPre => "step.pre",
            PipelinePoint::StepConfig => "step.config",
            PipelinePoint::StepTools => "step.tools",
            PipelinePoint::StepBlocks => "step.blocks",
            PipelinePoint::StepLlmCall => "step.llmCall",
            PipelinePoint::StepLlmError => "step.llmError",
            PipelinePoint::ToolCallPre => "toolCall.pre",
            PipelinePoint::ToolCallExec => "toolCall.exec",
            PipelinePoint::ToolCallPost => "toolCall.post",
            PipelinePoint::StepPost => "step.post",
            PipelinePoint::TurnPost => "turn.post",
            PipelinePoint::WorkspaceRepoAvailable => "workspace.repoAvailable",
            PipelinePoint::WorkspaceWorktreeMounted => "workspace.worktreeMounted",
        }
    }

    /// Points where the operation itself is interposable (`wrap`).
    pub fn is_wrap_point(&self) -> bool {
        matches!(self, PipelinePoint::StepLlmCall | PipelinePoint::ToolCallExec)
    }

    /// Points fired outside the turn loop.
    pub fn is_workspace_point(&self) -> bool {
        matches!(
            self,
            PipelinePoint::WorkspaceRepoAvailable | PipelinePoint::WorkspaceWorktreeMounted
        )
    }
}

impl std::fmt::Display for PipelinePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PipelinePoint {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PipelinePoint::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PipelineError::UnknownPoint(s.to_string()))
    }
}
