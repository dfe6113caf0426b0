//! Definitions and helpers shared by the unit tests
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use crate::nxdl_loader::parse_nxdl;
use crate::schema::Schema;

pub const MINIMAL_NXDL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<definition xmlns="http://definition.nexusformat.org/nxdl/3.1" name="NXtest" extends="NXobject" type="group" category="application">
  <symbols>
    <doc>Symbols used in the image shape</doc>
    <symbol name="n_x"><doc>Number of columns</doc></symbol>
    <symbol name="n_y"><doc>Number of rows</doc></symbol>
  </symbols>
  <doc>Definition used by the unit tests</doc>
  <group type="NXentry">
    <field name="title" type="NX_CHAR"/>
    <field name="start_time" type="NX_DATE_TIME" optional="true"/>
    <field name="temperature" type="NX_FLOAT" units="NX_TEMPERATURE" recommended="true"/>
    <field name="mode" optional="true">
      <enumeration>
        <item value="fast"/>
        <item value="slow"/>
      </enumeration>
    </field>
    <field name="count" type="NX_INT" optional="true"/>
    <field name="old_name" type="NX_CHAR" optional="true" deprecated="use title instead"/>
    <group type="NXsample">
      <field name="name" type="NX_CHAR"/>
      <field name="thickness" type="NX_FLOAT" units="NX_LENGTH" optional="true"/>
    </group>
    <group type="NXinstrument" optional="true">
      <field name="name" type="NX_CHAR" recommended="true"/>
    </group>
    <group name="data" type="NXdata" optional="true">
      <attribute name="signal" optional="true"/>
      <field name="image" type="NX_NUMBER" optional="true">
        <dimensions rank="2">
          <dim index="1" value="n_y"/>
          <dim index="2" value="n_x"/>
        </dimensions>
      </field>
      <field name="x" type="NX_FLOAT" units="NX_LENGTH" optional="true">
        <dimensions rank="1">
          <dim index="1" value="n_x"/>
        </dimensions>
      </field>
      <field name="y" type="NX_FLOAT" optional="true">
        <dimensions rank="1">
          <dim index="1" value="n_y"/>
        </dimensions>
      </field>
    </group>
  </group>
</definition>
"#;

pub const CHILD_NXDL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<definition name="NXchild" extends="NXtest" type="group" category="application">
  <group type="NXentry">
    <field name="operator" type="NX_CHAR"/>
    <field name="mode" recommended="true"/>
    <field name="temperature" optional="true"/>
  </group>
</definition>
"#;

/// A definition with one required field
pub const SIMPLE_NXDL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<definition name="NXsimple" extends="NXobject" type="group" category="application">
  <group type="NXentry">
    <field name="title" type="NX_CHAR"/>
    <field name="start_time" type="NX_DATE_TIME" optional="true"/>
    <field name="count" type="NX_INT" optional="true"/>
    <group name="data" type="NXdata" optional="true">
      <attribute name="signal" optional="true"/>
      <field name="DATA" type="NX_NUMBER" optional="true"/>
    </group>
  </group>
</definition>
"#;

pub fn test_schema() -> Arc<Schema> {
    Arc::new(parse_nxdl(MINIMAL_NXDL, Path::new("NXtest.nxdl.xml")).unwrap())
}

pub fn simple_schema() -> Arc<Schema> {
    Arc::new(parse_nxdl(SIMPLE_NXDL, Path::new("NXsimple.nxdl.xml")).unwrap())
}

/// A definitions tree laid out like the NeXus definitions repository
pub fn write_definitions() -> TempDir {
    let root = tempfile::tempdir().unwrap();
    let applications = root.path().join("applications");
    let contributed = root.path().join("contributed_definitions");
    std::fs::create_dir_all(&applications).unwrap();
    std::fs::create_dir_all(&contributed).unwrap();
    std::fs::write(applications.join("NXtest.nxdl.xml"), MINIMAL_NXDL).unwrap();
    std::fs::write(applications.join("NXsimple.nxdl.xml"), SIMPLE_NXDL).unwrap();
    std::fs::write(contributed.join("NXchild.nxdl.xml"), CHILD_NXDL).unwrap();
    root
}

/// Write a file inside a temporary directory and return its path
pub fn write_file(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}
