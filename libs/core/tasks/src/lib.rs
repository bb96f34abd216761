// [libs/core/tasks/src/lib.rs]
/*!
 * =================================================================
 * APARATO: TASK STRATUM (V1.0)
 * CLASIFICACIÓN: CORE STATE (ESTRATO L1)
 * RESPONSABILIDAD: CICLO DE VIDA DE TAREAS ASÍNCRONAS, TEMPORIZACIÓN
 * Y DESALOJO POR CAPACIDAD
 * =================================================================
 */

pub mod dispatch;
pub mod errors;
pub mod manager;

pub use dispatch::handle_tasks_method;
pub use errors::TaskError;
pub use manager::{TaskManager, DEFAULT_MAX_TASKS, DEFAULT_TASK_TIMEOUT, SWEEP_PERIOD};
pub use paygate_model::{Task, TaskStatus};
