//! 任务注册表
//!
//! (巡检类型, 会话) → 任务槽。任务槽在第一次被引用时创建，之后只会被重置，不会被移除。

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::models::{AuditJob, AuditType, JobSnapshot};

/// 任务键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub audit_type: AuditType,
    pub session: String,
}

impl JobKey {
    pub fn new(audit_type: AuditType, session: impl Into<String>) -> Self {
        Self {
            audit_type,
            session: session.into(),
        }
    }
}

impl Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.audit_type, self.session)
    }
}

/// 发给工作任务的控制信号，只在行与行之间被观察
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Run,
    Pause,
    /// 处理完当前行后落盘并结束
    Finish,
    /// 硬重置，工作任务直接退出
    End,
}

/// 任务槽：任务记录 + 控制信道
pub struct JobSlot {
    record: Mutex<AuditJob>,
    control: watch::Sender<Control>,
}

impl JobSlot {
    fn new(audit_type: AuditType, message_capacity: usize) -> Self {
        let (control, _) = watch::channel(Control::Run);
        Self {
            record: Mutex::new(AuditJob::new(audit_type, message_capacity)),
            control,
        }
    }

    fn lock(&self) -> MutexGuard<'_, AuditJob> {
        // 记录只含普通数据，持锁方 panic 后内容仍然可用
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 在锁内读改写任务记录；闭包里不能有 await
    pub fn with_record<R>(&self, f: impl FnOnce(&mut AuditJob) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn snapshot(&self, recent: usize) -> JobSnapshot {
        self.lock().snapshot(recent)
    }

    pub fn signal(&self, control: Control) {
        self.control.send_replace(control);
    }

    pub fn subscribe(&self) -> watch::Receiver<Control> {
        self.control.subscribe()
    }
}

/// 任务注册表
pub struct JobRegistry {
    slots: Mutex<HashMap<JobKey, Arc<JobSlot>>>,
    message_capacity: usize,
}

impl JobRegistry {
    pub fn new(message_capacity: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            message_capacity,
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<JobKey, Arc<JobSlot>>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 取任务槽，不存在则创建
    pub fn get_or_create(&self, key: &JobKey) -> Arc<JobSlot> {
        self.slots()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(JobSlot::new(key.audit_type, self.message_capacity)))
            .clone()
    }

    pub fn get(&self, key: &JobKey) -> Option<Arc<JobSlot>> {
        self.slots().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
