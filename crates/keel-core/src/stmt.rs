mod alias;
pub use alias::{Alias, AliasSource};

mod condition;
pub use condition::{BinaryOp, Condition, Conjunction, WhereClause};

mod entity;
pub use entity::Entity;

mod expr;
pub use expr::{Expr, Fields, RawSql};

mod expression_map;
pub use expression_map::{
    primary_key_condition, ConflictAction, Direction, ExpressionMap, LockMode, OnConflict, OrderBy,
    QueryKind, Returning, ValueSet,
};

mod join;
pub use join::{JoinAttribute, JoinKind};

mod params;
pub use params::{Param, Params, Sql};

mod record;
pub use record::{Record, Row};

mod relation_count;
pub use relation_count::{RelationCountAttribute, RelationCountResult};

mod relation_id;
pub use relation_id::{RelationIdAttribute, RelationIdResult};

mod value;
pub use value::Value;
