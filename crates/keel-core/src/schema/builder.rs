use super::{
    Column, ColumnRef, ColumnRole, JoinColumn, Junction, Model, ModelId, Relation, RelationKind,
    Schema, TableKind,
};
use crate::Result;

use indexmap::IndexMap;

/// Assembles a [`Schema`] from model definitions.
///
/// Relations name their target model by name, so models may be declared in
/// any order. `build` resolves names, creates foreign key columns for owning
/// relations, flattens single-table inheritance and verifies the result.
#[derive(Debug, Default)]
pub struct Builder {
    models: Vec<ModelDef>,
}

/// Declaration of one model.
#[derive(Debug, Clone)]
pub struct ModelDef {
    name: String,
    table: String,
    kind: TableKind,
    columns: Vec<Column>,
    relations: Vec<RelationDef>,
    parent: Option<String>,
    discriminator_value: Option<String>,
}

#[derive(Debug, Clone)]
struct RelationDef {
    property: String,
    kind: RelationKind,
    target: String,
    join_columns: Vec<JoinColumn>,
    inverse: Option<String>,
    junction: Option<Junction>,

    /// Foreign key columns are part of the owning model's primary key.
    primary: bool,
}

/// Tracks state during the build process
struct BuildSchema<'a> {
    defs: &'a [ModelDef],

    /// Maps model names to identifiers. Identifiers are reserved before the
    /// models are built.
    lookup: IndexMap<&'a str, ModelId>,
}

impl Builder {
    pub fn model(&mut self, def: ModelDef) -> &mut Self {
        self.models.push(def);
        self
    }

    pub fn build(&self) -> Result<Schema> {
        let mut lookup = IndexMap::new();
        for (index, def) in self.models.iter().enumerate() {
            if lookup.insert(def.name.as_str(), ModelId(index)).is_some() {
                crate::bail!("model `{}` is declared more than once", def.name);
            }
        }

        let cx = BuildSchema {
            defs: &self.models,
            lookup,
        };

        let mut models = self
            .models
            .iter()
            .enumerate()
            .map(|(index, def)| cx.build_model(ModelId(index), def))
            .collect::<Result<Vec<_>>>()?;

        cx.link_inheritance(&mut models)?;

        let schema = Schema { models };
        verify(&schema)?;
        Ok(schema)
    }
}

impl ModelDef {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> ModelDef {
        ModelDef {
            name: name.into(),
            table: table.into(),
            kind: TableKind::Regular,
            columns: vec![],
            relations: vec![],
            parent: None,
            discriminator_value: None,
        }
    }

    pub fn view(mut self) -> ModelDef {
        self.kind = TableKind::View;
        self
    }

    pub fn junction(mut self) -> ModelDef {
        self.kind = TableKind::Junction;
        self
    }

    pub fn column(mut self, column: Column) -> ModelDef {
        self.columns.push(column);
        self
    }

    /// Declares this model as a single-table inheritance child.
    pub fn child_of(mut self, parent: impl Into<String>, discriminator: impl Into<String>) -> ModelDef {
        self.parent = Some(parent.into());
        self.discriminator_value = Some(discriminator.into());
        self
    }

    /// Discriminator value of an inheritance root.
    pub fn discriminator_value(mut self, value: impl Into<String>) -> ModelDef {
        self.discriminator_value = Some(value.into());
        self
    }

    /// Owning many-to-one. `join_columns` pairs local foreign key column
    /// names with the target properties they reference.
    pub fn many_to_one(
        self,
        property: impl Into<String>,
        target: impl Into<String>,
        join_columns: &[(&str, &str)],
    ) -> ModelDef {
        self.owning(property, RelationKind::ManyToOne, target, join_columns, None)
    }

    /// Owning one-to-one.
    pub fn one_to_one(
        self,
        property: impl Into<String>,
        target: impl Into<String>,
        join_columns: &[(&str, &str)],
    ) -> ModelDef {
        self.owning(property, RelationKind::OneToOne, target, join_columns, None)
    }

    /// Inverse one-to-one, paired with an owning one-to-one on the target.
    pub fn one_to_one_inverse(
        self,
        property: impl Into<String>,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> ModelDef {
        self.inverse(property, RelationKind::OneToOne, target, inverse)
    }

    /// One-to-many, paired with a many-to-one on the target.
    pub fn one_to_many(
        self,
        property: impl Into<String>,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> ModelDef {
        self.inverse(property, RelationKind::OneToMany, target, inverse)
    }

    /// Owning many-to-many through `junction`.
    pub fn many_to_many(
        mut self,
        property: impl Into<String>,
        target: impl Into<String>,
        junction: Junction,
    ) -> ModelDef {
        self.relations.push(RelationDef {
            property: property.into(),
            kind: RelationKind::ManyToMany,
            target: target.into(),
            join_columns: vec![],
            inverse: None,
            junction: Some(junction),
            primary: false,
        });
        self
    }

    /// Inverse many-to-many, paired with an owning many-to-many on the target.
    pub fn many_to_many_inverse(
        self,
        property: impl Into<String>,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> ModelDef {
        self.inverse(property, RelationKind::ManyToMany, target, inverse)
    }

    /// Names the property on the target that pairs with the most recently
    /// declared owning relation.
    pub fn paired_with(mut self, inverse: impl Into<String>) -> ModelDef {
        if let Some(relation) = self.relations.last_mut() {
            relation.inverse = Some(inverse.into());
        }
        self
    }

    /// Makes the foreign key columns of the most recently declared owning
    /// relation part of the primary key.
    pub fn part_of_primary_key(mut self) -> ModelDef {
        if let Some(relation) = self.relations.last_mut() {
            relation.primary = true;
        }
        self
    }

    fn owning(
        mut self,
        property: impl Into<String>,
        kind: RelationKind,
        target: impl Into<String>,
        join_columns: &[(&str, &str)],
        inverse: Option<String>,
    ) -> ModelDef {
        self.relations.push(RelationDef {
            property: property.into(),
            kind,
            target: target.into(),
            join_columns: join_columns
                .iter()
                .map(|(name, referenced)| JoinColumn {
                    name: name.to_string(),
                    referenced: referenced.to_string(),
                })
                .collect(),
            inverse,
            junction: None,
            primary: false,
        });
        self
    }

    fn inverse(
        mut self,
        property: impl Into<String>,
        kind: RelationKind,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> ModelDef {
        self.relations.push(RelationDef {
            property: property.into(),
            kind,
            target: target.into(),
            join_columns: vec![],
            inverse: Some(inverse.into()),
            junction: None,
            primary: false,
        });
        self
    }
}

impl Junction {
    pub fn new(
        table: impl Into<String>,
        owner_columns: &[(&str, &str)],
        inverse_columns: &[(&str, &str)],
    ) -> Junction {
        let to_columns = |columns: &[(&str, &str)]| {
            columns
                .iter()
                .map(|(name, referenced)| JoinColumn {
                    name: name.to_string(),
                    referenced: referenced.to_string(),
                })
                .collect()
        };

        Junction {
            table: table.into(),
            owner_columns: to_columns(owner_columns),
            inverse_columns: to_columns(inverse_columns),
        }
    }
}

impl<'a> BuildSchema<'a> {
    fn resolve(&self, name: &str) -> Result<ModelId> {
        self.lookup
            .get(name)
            .copied()
            .ok_or_else(|| crate::err!("relation target `{name}` is not a registered model"))
    }

    /// Declared columns of a model and its ancestors, ancestors first.
    fn declared_columns(&self, id: ModelId) -> Result<Vec<&'a Column>> {
        let def = &self.defs[id.0];
        let mut columns = match &def.parent {
            Some(parent) => self.declared_columns(self.resolve(parent)?)?,
            None => vec![],
        };
        columns.extend(def.columns.iter());
        Ok(columns)
    }

    fn build_model(&self, id: ModelId, def: &ModelDef) -> Result<Model> {
        let mut columns = vec![];

        for column in &def.columns {
            let mut column = column.clone();
            column.owner = id;
            columns.push(column);
        }

        let mut relations = vec![];

        for rel in &def.relations {
            let target = self.resolve(&rel.target)?;
            let owner = rel.junction.is_some() || !rel.join_columns.is_empty();

            if owner && rel.junction.is_none() {
                let target_columns = self.declared_columns(target)?;

                for jc in &rel.join_columns {
                    let referenced = target_columns
                        .iter()
                        .find(|c| c.property == jc.referenced)
                        .ok_or_else(|| {
                            crate::err!(
                                "{}.{} references unknown property `{}` on {}",
                                def.name,
                                rel.property,
                                jc.referenced,
                                rel.target
                            )
                        })?;

                    let fk = ColumnRef {
                        model: target,
                        property: jc.referenced.clone(),
                    };

                    // An explicitly declared column with the same name keeps its
                    // own property and only gains the reference.
                    if let Some(existing) = columns.iter_mut().find(|c| c.name == jc.name) {
                        existing.references = Some(fk);
                        existing.primary_key |= rel.primary;
                        continue;
                    }

                    let mut column = Column::new(rel.property.clone(), referenced.ty).name(&jc.name);
                    column.nullable = !rel.primary;
                    column.primary_key = rel.primary;
                    column.is_virtual = true;
                    column.references = Some(fk);
                    column.owner = id;
                    columns.push(column);
                }
            }

            relations.push(Relation {
                property: rel.property.clone(),
                kind: rel.kind,
                target,
                owner,
                join_columns: rel.join_columns.clone(),
                inverse: rel.inverse.clone(),
                junction: rel.junction.clone(),
            });
        }

        Ok(Model {
            id,
            name: def.name.clone(),
            table: def.table.clone(),
            kind: def.kind,
            columns,
            relations,
            discriminator_value: def.discriminator_value.clone(),
            parent: def.parent.as_deref().map(|p| self.resolve(p)).transpose()?,
            children: vec![],
        })
    }

    /// Flattens single-table inheritance: children inherit their ancestors'
    /// columns, relations and table; ancestors carry their descendants'
    /// columns so the shared table is selected in full.
    fn link_inheritance(&self, models: &mut [Model]) -> Result<()> {
        for index in 0..models.len() {
            if let Some(parent) = models[index].parent {
                models[parent.0].children.push(ModelId(index));
            }
        }

        let own: Vec<(Vec<Column>, Vec<Relation>)> = models
            .iter()
            .map(|m| (m.columns.clone(), m.relations.clone()))
            .collect();

        for index in 0..models.len() {
            let id = ModelId(index);

            let mut chain = vec![];
            let mut current = models[index].parent;
            while let Some(parent) = current {
                if chain.contains(&parent) || parent == id {
                    crate::bail!("inheritance cycle at model `{}`", models[index].name);
                }
                chain.push(parent);
                current = models[parent.0].parent;
            }
            chain.reverse();

            let Some(root) = chain.first().copied() else {
                continue;
            };

            let mut columns = vec![];
            let mut relations = vec![];
            for ancestor in &chain {
                columns.extend(own[ancestor.0].0.iter().cloned());
                relations.extend(own[ancestor.0].1.iter().cloned());
            }
            columns.extend(models[index].columns.drain(..));
            relations.extend(models[index].relations.drain(..));

            models[index].columns = columns;
            models[index].relations = relations;
            models[index].table = models[root.0].table.clone();

            // Every ancestor also selects this descendant's own columns.
            for ancestor in chain {
                let descendant_columns = own[index].0.clone();
                models[ancestor.0].columns.extend(descendant_columns);
            }
        }

        Ok(())
    }
}

fn verify(schema: &Schema) -> Result<()> {
    for model in &schema.models {
        if model.kind == TableKind::Regular && model.primary_columns().next().is_none() {
            crate::bail!("model `{}` has no primary key", model.name);
        }

        if !model.children.is_empty() || model.parent.is_some() {
            if model.discriminator_column().is_none() {
                crate::bail!(
                    "model `{}` uses single-table inheritance without a discriminator column",
                    model.name
                );
            }
        }

        for relation in &model.relations {
            if relation.owner {
                continue;
            }

            let Some(inverse) = relation.inverse_relation(schema) else {
                crate::bail!(
                    "{}.{} names an inverse relation that does not exist on {}",
                    model.name,
                    relation.property,
                    relation.target(schema).name
                );
            };

            if !inverse.owner {
                crate::bail!(
                    "{}.{} and its inverse {}.{} are both non-owning",
                    model.name,
                    relation.property,
                    relation.target(schema).name,
                    inverse.property
                );
            }
        }

        if let Some(column) = model.columns.iter().find(|c| c.role == ColumnRole::Discriminator) {
            if column.is_virtual {
                crate::bail!("discriminator column `{}` cannot be virtual", column.name);
            }
        }
    }

    Ok(())
}
