// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::ConfigError;
use thiserror::Error;

use crate::domain::repositories::task_repository::RepositoryError;
use crate::queue::task_runner::RunnerError;

/// Worker错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("仓库错误: {0}")]
    RepositoryError(#[from] RepositoryError),

    #[error("执行器错误: {0}")]
    RunnerError(#[from] RunnerError),

    #[error("配置错误: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("内部错误: {0}")]
    InternalError(String),
}
