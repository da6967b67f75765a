//! 权限检查服务
//! 按国家划分的 RBAC：纯判定函数加带审计的包装

use std::sync::Arc;

use crate::{
    clock::Clock,
    models::{
        same_country, Action, AdminChange, AdminOp, AdminTarget, AuditEvent, AuditEventKind,
        Decision, DenyReason, Role, Session,
    },
    services::AuditService,
};

/// 请求全部国家时使用的审计目标
pub const ALL_COUNTRIES: &str = "*";

/// 本国范围内的权限矩阵
fn role_allows(role: Role, action: Action) -> bool {
    match role {
        Role::MasterUser | Role::CountryAdmin => true,
        Role::Analyst => action.is_read_only(),
        Role::Viewer => matches!(action, Action::ViewDashboard),
    }
}

/// 判定 `session` 能否对 `requested_country` 执行 `action`。
/// `None` 表示请求全部国家
pub fn authorize(session: &Session, requested_country: Option<&str>, action: Action) -> Decision {
    if session.role == Role::MasterUser {
        return Decision::Allow;
    }

    // 审计日志跨所有国家
    if action == Action::ReadAuditLog {
        return Decision::Deny(DenyReason::CountryScopeViolation);
    }

    let in_scope = match (requested_country, session.country.as_deref()) {
        (Some(requested), Some(own)) => same_country(requested, own),
        _ => false,
    };
    if !in_scope {
        return Decision::Deny(DenyReason::CountryScopeViolation);
    }

    if role_allows(session.role, action) {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::Forbidden)
    }
}

/// 判定 `actor` 能否对 `target` 账户执行 `op`
pub fn authorize_user_admin(actor: &Session, target: AdminTarget<'_>, op: AdminOp<'_>) -> Decision {
    match actor.role {
        Role::MasterUser => return Decision::Allow,
        Role::Analyst | Role::Viewer => return Decision::Deny(DenyReason::Forbidden),
        Role::CountryAdmin => {}
    }

    let same = match (target.country, actor.country.as_deref()) {
        (Some(target_country), Some(own)) => same_country(target_country, own),
        _ => false,
    };

    // 先比较角色层级，再比较国家
    match (target.role, op) {
        (Role::MasterUser, _) => {
            return Decision::Deny(DenyReason::PolicyViolation(
                "country administrators cannot manage master users",
            ))
        }
        (Role::CountryAdmin, AdminOp::Read) => {}
        (Role::CountryAdmin, _) => {
            return Decision::Deny(DenyReason::PolicyViolation(
                "country administrators cannot create or modify other country administrators",
            ))
        }
        (Role::Analyst | Role::Viewer, _) => {}
    }

    if !same {
        return Decision::Deny(DenyReason::CountryScopeViolation);
    }

    if let AdminOp::Modify(change) = op {
        match change {
            AdminChange::Role(Role::Analyst | Role::Viewer) => {}
            AdminChange::Role(_) => {
                return Decision::Deny(DenyReason::PolicyViolation(
                    "country administrators may only assign the analyst or viewer role",
                ))
            }
            AdminChange::Country(new_country) => {
                let stays = match (new_country.as_deref(), actor.country.as_deref()) {
                    (Some(new_country), Some(own)) => same_country(new_country, own),
                    _ => false,
                };
                if !stays {
                    return Decision::Deny(DenyReason::PolicyViolation(
                        "country administrators cannot move users to another country",
                    ));
                }
            }
            AdminChange::Password(_) | AdminChange::Active(_) | AdminChange::Unlock => {}
        }
    }

    Decision::Allow
}

/// 会话可选择的国家，按目录顺序
pub fn allowed_countries(session: &Session, catalogue: &[String]) -> Vec<String> {
    match (session.role, session.country.as_deref()) {
        (Role::MasterUser, _) => catalogue.to_vec(),
        (_, Some(own)) => vec![own.to_string()],
        (_, None) => Vec::new(),
    }
}

/// 页面应显示的国家：主用户保留自己的选择，其他人固定为本国
pub fn effective_country(session: &Session, selected: Option<&str>) -> Option<String> {
    match session.role {
        Role::MasterUser => selected.map(str::to_string),
        _ => session.country.clone(),
    }
}

/// 会话在自身范围内可执行的操作
pub fn allowed_actions(session: &Session) -> Vec<Action> {
    let country = effective_country(session, None);
    Action::ALL
        .into_iter()
        .filter(|action| authorize(session, country.as_deref(), *action).is_allowed())
        .collect()
}

/// 按会话范围过滤数据行：主用户看到全部，其他角色只保留本国的行。
/// 未登录或行内没有国家字段时结果为空
pub fn filter_by_scope<T, F>(session: Option<&Session>, items: Vec<T>, country_of: F) -> Vec<T>
where
    F: Fn(&T) -> Option<&str>,
{
    let Some(session) = session else {
        return Vec::new();
    };

    match (session.role, session.country.as_deref()) {
        (Role::MasterUser, _) => items,
        (_, Some(own)) => items
            .into_iter()
            .filter(|item| country_of(item).is_some_and(|c| same_country(c, own)))
            .collect(),
        (_, None) => Vec::new(),
    }
}

/// 带审计的授权：每次越权恰好产生一条 `unauthorized-access-attempt` 事件
pub struct PermissionService {
    audit: Arc<AuditService>,
    clock: Arc<dyn Clock>,
    countries: Vec<String>,
}

impl PermissionService {
    pub fn new(audit: Arc<AuditService>, clock: Arc<dyn Clock>, countries: Vec<String>) -> Self {
        Self {
            audit,
            clock,
            countries,
        }
    }

    pub fn countries(&self) -> &[String] {
        &self.countries
    }

    pub fn is_known_country(&self, country: &str) -> bool {
        self.countries.iter().any(|c| same_country(c, country))
    }

    /// 检查数据访问权限
    pub async fn check(
        &self,
        session: &Session,
        requested_country: Option<&str>,
        action: Action,
    ) -> Decision {
        let decision = authorize(session, requested_country, action);

        if decision == Decision::Deny(DenyReason::CountryScopeViolation) {
            let target = requested_country.unwrap_or(ALL_COUNTRIES);
            tracing::warn!(
                identity = %session.identity,
                role = %session.role,
                own_country = ?session.country,
                requested_country = %target,
                action = %action,
                "Cross-country access attempt"
            );
            self.audit
                .record(
                    AuditEvent::new(
                        AuditEventKind::UnauthorizedAccessAttempt,
                        &session.identity,
                        self.clock.now(),
                    )
                    .with_target(target)
                    .with_detail(format!("action={}", action)),
                )
                .await;
        } else if let Decision::Deny(reason) = decision {
            tracing::debug!(
                identity = %session.identity,
                action = %action,
                reason = ?reason,
                "Access denied"
            );
        }

        decision
    }

    /// 检查用户管理权限
    pub async fn check_admin(
        &self,
        actor: &Session,
        target: AdminTarget<'_>,
        op: AdminOp<'_>,
    ) -> Decision {
        let decision = authorize_user_admin(actor, target, op);

        if decision == Decision::Deny(DenyReason::CountryScopeViolation) {
            let op_name = match op {
                AdminOp::Read => "read",
                AdminOp::Create => "create",
                AdminOp::Modify(change) => change.field(),
            };
            tracing::warn!(
                identity = %actor.identity,
                target = %target.identity,
                target_country = ?target.country,
                op = %op_name,
                "Cross-country user management attempt"
            );
            self.audit
                .record(
                    AuditEvent::new(
                        AuditEventKind::UnauthorizedAccessAttempt,
                        &actor.identity,
                        self.clock.now(),
                    )
                    .with_target(target.identity)
                    .with_detail(format!(
                        "user_admin op={} country={}",
                        op_name,
                        target.country.unwrap_or(ALL_COUNTRIES)
                    )),
                )
                .await;
        }

        decision
    }
}
