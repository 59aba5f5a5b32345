use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub department: String,
    pub manager_id: Option<EmployeeId>,
    pub join_date: NaiveDate,
}

impl Employee {
    pub fn is_top_level(&self) -> bool {
        self.manager_id.is_none()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("employee `{0}` cannot be their own manager")]
    SelfManager(EmployeeId),
    #[error("assigning `{manager}` as manager of `{employee}` would create a reporting cycle")]
    ReportingCycle { employee: EmployeeId, manager: EmployeeId },
    #[error("unknown employee `{0}`")]
    UnknownEmployee(EmployeeId),
}

/// Id-indexed snapshot of the reporting hierarchy. The manager reference is a
/// plain back-reference, so acyclicity is enforced here at write time rather
/// than by the shape of the type.
#[derive(Clone, Debug, Default)]
pub struct OrgChart {
    employees: HashMap<EmployeeId, Employee>,
}

impl OrgChart {
    /// Builds a snapshot from directory rows. Rows are taken as-is; edges are
    /// validated when mutated through [`OrgChart::insert`] or
    /// [`OrgChart::assign_manager`], and every walk carries a visited-set
    /// guard so a corrupt snapshot cannot loop.
    pub fn from_employees(employees: impl IntoIterator<Item = Employee>) -> Self {
        Self {
            employees: employees.into_iter().map(|employee| (employee.id.clone(), employee)).collect(),
        }
    }

    pub fn get(&self, id: &EmployeeId) -> Option<&Employee> {
        self.employees.get(id)
    }

    pub fn contains(&self, id: &EmployeeId) -> bool {
        self.employees.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.employees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Employee> {
        self.employees.values()
    }

    /// Adds or replaces an employee, rejecting a manager edge that would point
    /// at the employee itself or close a reporting cycle.
    pub fn insert(&mut self, employee: Employee) -> Result<(), HierarchyError> {
        if let Some(manager_id) = &employee.manager_id {
            if *manager_id == employee.id {
                return Err(HierarchyError::SelfManager(employee.id.clone()));
            }
            if self.chain_from(manager_id).contains(&employee.id) {
                return Err(HierarchyError::ReportingCycle {
                    employee: employee.id.clone(),
                    manager: manager_id.clone(),
                });
            }
        }
        self.employees.insert(employee.id.clone(), employee);
        Ok(())
    }

    /// Re-points an existing employee's manager edge after the same cycle
    /// validation as [`OrgChart::insert`]. The new manager must be a known
    /// employee.
    pub fn assign_manager(
        &mut self,
        employee_id: &EmployeeId,
        manager_id: Option<EmployeeId>,
    ) -> Result<(), HierarchyError> {
        if !self.employees.contains_key(employee_id) {
            return Err(HierarchyError::UnknownEmployee(employee_id.clone()));
        }
        if let Some(manager_id) = &manager_id {
            if manager_id == employee_id {
                return Err(HierarchyError::SelfManager(employee_id.clone()));
            }
            if !self.employees.contains_key(manager_id) {
                return Err(HierarchyError::UnknownEmployee(manager_id.clone()));
            }
            if self.chain_from(manager_id).contains(employee_id) {
                return Err(HierarchyError::ReportingCycle {
                    employee: employee_id.clone(),
                    manager: manager_id.clone(),
                });
            }
        }
        if let Some(employee) = self.employees.get_mut(employee_id) {
            employee.manager_id = manager_id;
        }
        Ok(())
    }

    /// The management chain above an employee, nearest manager first.
    pub fn manager_chain(&self, employee_id: &EmployeeId) -> Vec<EmployeeId> {
        let Some(employee) = self.employees.get(employee_id) else {
            return Vec::new();
        };
        match &employee.manager_id {
            Some(manager_id) => self.chain_from(manager_id),
            None => Vec::new(),
        }
    }

    fn chain_from(&self, start: &EmployeeId) -> Vec<EmployeeId> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = start.clone();

        loop {
            if !visited.insert(current.clone()) {
                break;
            }
            chain.push(current.clone());
            let Some(employee) = self.employees.get(&current) else {
                break;
            };
            let Some(manager_id) = &employee.manager_id else {
                break;
            };
            current = manager_id.clone();
        }

        chain
    }

    pub fn is_ancestor(&self, ancestor: &EmployeeId, of: &EmployeeId) -> bool {
        self.manager_chain(of).contains(ancestor)
    }

    /// Direct reports of the given employee, ordered by id for determinism.
    pub fn direct_reports(&self, manager_id: &EmployeeId) -> Vec<&Employee> {
        let mut reports: Vec<&Employee> = self
            .employees
            .values()
            .filter(|employee| employee.manager_id.as_ref() == Some(manager_id))
            .collect();
        reports.sort_by(|left, right| left.id.cmp(&right.id));
        reports
    }

    pub fn subordinate_count(&self, manager_id: &EmployeeId) -> usize {
        self.employees
            .values()
            .filter(|employee| employee.manager_id.as_ref() == Some(manager_id))
            .count()
    }

    /// Employees in a department, excluding the given id, ordered by id.
    pub fn department_peers(&self, department: &str, exclude: &EmployeeId) -> Vec<&Employee> {
        let mut peers: Vec<&Employee> = self
            .employees
            .values()
            .filter(|employee| employee.department == department && employee.id != *exclude)
            .collect();
        peers.sort_by(|left, right| left.id.cmp(&right.id));
        peers
    }

    /// Employees with no manager of their own (the top-level/HR fallback
    /// role), ordered by id.
    pub fn top_level(&self) -> Vec<&Employee> {
        let mut roots: Vec<&Employee> =
            self.employees.values().filter(|employee| employee.is_top_level()).collect();
        roots.sort_by(|left, right| left.id.cmp(&right.id));
        roots
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Employee, EmployeeId, HierarchyError, OrgChart};

    fn employee(id: &str, department: &str, manager: Option<&str>) -> Employee {
        Employee {
            id: EmployeeId::new(id),
            name: id.to_ascii_uppercase(),
            department: department.to_string(),
            manager_id: manager.map(EmployeeId::new),
            join_date: NaiveDate::from_ymd_opt(2024, 1, 2).expect("valid date"),
        }
    }

    fn sample_chart() -> OrgChart {
        OrgChart::from_employees(vec![
            employee("e-root", "people", None),
            employee("e-head", "engineering", Some("e-root")),
            employee("e-lead", "engineering", Some("e-head")),
            employee("e-dev", "engineering", Some("e-lead")),
        ])
    }

    #[test]
    fn manager_chain_walks_to_the_root() {
        let chart = sample_chart();
        let chain = chart.manager_chain(&EmployeeId::new("e-dev"));
        assert_eq!(
            chain,
            vec![EmployeeId::new("e-lead"), EmployeeId::new("e-head"), EmployeeId::new("e-root")]
        );
    }

    #[test]
    fn insert_rejects_self_manager() {
        let mut chart = sample_chart();
        let error = chart
            .insert(employee("e-solo", "sales", Some("e-solo")))
            .expect_err("self-managing edge must be rejected");
        assert_eq!(error, HierarchyError::SelfManager(EmployeeId::new("e-solo")));
    }

    #[test]
    fn assign_manager_rejects_reporting_cycle() {
        let mut chart = sample_chart();
        let error = chart
            .assign_manager(&EmployeeId::new("e-head"), Some(EmployeeId::new("e-dev")))
            .expect_err("closing the loop head -> dev must be rejected");
        assert_eq!(
            error,
            HierarchyError::ReportingCycle {
                employee: EmployeeId::new("e-head"),
                manager: EmployeeId::new("e-dev"),
            }
        );
    }

    #[test]
    fn chain_walk_survives_a_corrupt_snapshot() {
        // Built from raw rows, so the cycle bypasses insert validation.
        let chart = OrgChart::from_employees(vec![
            employee("e-a", "ops", Some("e-b")),
            employee("e-b", "ops", Some("e-a")),
        ]);
        let chain = chart.manager_chain(&EmployeeId::new("e-a"));
        assert_eq!(chain, vec![EmployeeId::new("e-b"), EmployeeId::new("e-a")]);
    }

    #[test]
    fn top_level_and_subordinate_queries() {
        let chart = sample_chart();
        let roots: Vec<&str> = chart.top_level().iter().map(|e| e.id.0.as_str()).collect();
        assert_eq!(roots, vec!["e-root"]);
        assert_eq!(chart.subordinate_count(&EmployeeId::new("e-head")), 1);
        assert_eq!(chart.subordinate_count(&EmployeeId::new("e-dev")), 0);

        let peers: Vec<&str> = chart
            .department_peers("engineering", &EmployeeId::new("e-lead"))
            .iter()
            .map(|e| e.id.0.as_str())
            .collect();
        assert_eq!(peers, vec!["e-dev", "e-head"]);
    }

    #[test]
    fn is_ancestor_ignores_unrelated_branches() {
        let mut chart = sample_chart();
        chart.insert(employee("e-sales", "sales", Some("e-root"))).expect("insert");
        assert!(chart.is_ancestor(&EmployeeId::new("e-root"), &EmployeeId::new("e-dev")));
        assert!(!chart.is_ancestor(&EmployeeId::new("e-sales"), &EmployeeId::new("e-dev")));
    }
}
