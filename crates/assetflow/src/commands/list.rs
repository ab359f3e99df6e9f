//! Task listing.

use assetflow_pipeline::{Task, TaskName};

/// Render a task graph as nested `series(...)` / `parallel(...)` calls.
pub fn describe(task: &Task) -> String {
    fn join(tasks: &[Task]) -> String {
        tasks.iter().map(describe).collect::<Vec<_>>().join(", ")
    }

    match task {
        Task::Run(name) => name.to_string(),
        Task::Series(tasks) => format!("series({})", join(tasks)),
        Task::Parallel(tasks) => format!("parallel({})", join(tasks)),
    }
}

/// Run the list command.
pub fn run() {
    // clean-dist only exists as a step of build
    for name in TaskName::ALL.into_iter().filter(|n| *n != TaskName::CleanDist) {
        match name.graph() {
            Task::Run(_) => println!("{}", name),
            composite => println!("{:<10} {}", name.as_str(), describe(&composite)),
        }
    }
}
