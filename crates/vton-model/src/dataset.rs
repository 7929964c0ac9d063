//! Dataset assembly: per-sample tensor bundles for batched inference.
//!
//! The dataroot follows the staging layout the API writes into:
//!
//! ```text
//! <dataroot>/<datamode>/image/        person photos
//! <dataroot>/<datamode>/cloth/        garment photos
//! <dataroot>/<datamode>/cloth-mask/   binary garment masks
//! <dataroot>/<datamode>/image-parse/  label maps
//! <dataroot>/<datamode>/pose/         cached skeleton JSON
//! ```
//!
//! Derived inputs missing on disk are produced on the fly and cached
//! back: cloth masks via thresholding, skeletons via the landmark
//! network, parse maps via the pose-derived coarse parser.

use std::fs;
use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use image::{GrayImage, RgbImage};
use vton_core::{read_pairs, Error, Keypoint, PairEntry, ParseLabel, PoseSkeleton, Result};
use vton_preprocess::{cloth_mask, parse_from_pose};
use vton_vision::image_to_tensor;

use crate::inference_err;
use crate::pose::{read_skeleton, PoseEstimator};

#[derive(Debug, Clone)]
pub struct DatasetOptions {
    pub dataroot: PathBuf,
    pub datamode: String,
    pub data_list: PathBuf,
    pub fine_width: usize,
    pub fine_height: usize,
    /// Half-width in pixels of the square drawn per pose keypoint.
    pub radius: usize,
}

impl DatasetOptions {
    pub fn new(
        dataroot: impl Into<PathBuf>,
        datamode: impl Into<String>,
        data_list: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dataroot: dataroot.into(),
            datamode: datamode.into(),
            data_list: data_list.into(),
            fine_width: 192,
            fine_height: 256,
            radius: 5,
        }
    }
}

/// All tensors one forward pass needs for a single sample, CPU-resident.
#[derive(Debug)]
pub struct SampleBundle {
    pub im_name: String,
    pub c_name: String,
    /// Person photo, `[3, h, w]` in [-1, 1].
    pub image: Tensor,
    /// Garment photo, `[3, h, w]` in [-1, 1].
    pub cloth: Tensor,
    /// Garment mask, `[1, h, w]` in [0, 1].
    pub cloth_mask: Tensor,
    /// Shape + head + pose map, `[22, h, w]`.
    pub agnostic: Tensor,
    /// One channel per keypoint, `[18, h, w]` in {-1, 1}.
    pub pose_map: Tensor,
    /// Union of keypoint squares for display, `[1, h, w]`.
    pub pose_vis: Tensor,
    /// Head crop of the person, `[3, h, w]`, -1 elsewhere.
    pub head: Tensor,
    /// Blurred body silhouette, `[1, h, w]` in [-1, 1].
    pub shape: Tensor,
    /// Garment region crop of the person, `[3, h, w]`, +1 elsewhere.
    pub parse_cloth: Tensor,
    /// Reference checkerboard for warp visualization, `[3, h, w]`.
    pub grid_image: Tensor,
}

/// A collated batch of samples.
pub struct Batch {
    pub im_names: Vec<String>,
    pub c_names: Vec<String>,
    pub image: Tensor,
    pub cloth: Tensor,
    pub cloth_mask: Tensor,
    pub agnostic: Tensor,
    pub pose_map: Tensor,
    pub pose_vis: Tensor,
    pub head: Tensor,
    pub shape: Tensor,
    pub parse_cloth: Tensor,
    pub grid_image: Tensor,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.im_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.im_names.is_empty()
    }

    /// Move every tensor of the batch to `device`.
    pub fn to_device(&self, device: &Device) -> Result<Batch> {
        let mv = |t: &Tensor| t.to_device(device).map_err(inference_err);
        Ok(Batch {
            im_names: self.im_names.clone(),
            c_names: self.c_names.clone(),
            image: mv(&self.image)?,
            cloth: mv(&self.cloth)?,
            cloth_mask: mv(&self.cloth_mask)?,
            agnostic: mv(&self.agnostic)?,
            pose_map: mv(&self.pose_map)?,
            pose_vis: mv(&self.pose_vis)?,
            head: mv(&self.head)?,
            shape: mv(&self.shape)?,
            parse_cloth: mv(&self.parse_cloth)?,
            grid_image: mv(&self.grid_image)?,
        })
    }
}

/// Stack sample bundles into a batch.
pub fn collate(samples: &[SampleBundle]) -> Result<Batch> {
    if samples.is_empty() {
        return Err(Error::Dataset("cannot collate an empty batch".into()));
    }
    let stack = |field: fn(&SampleBundle) -> &Tensor| -> Result<Tensor> {
        let tensors: Vec<Tensor> = samples.iter().map(|s| field(s).clone()).collect();
        Tensor::stack(&tensors, 0).map_err(inference_err)
    };

    Ok(Batch {
        im_names: samples.iter().map(|s| s.im_name.clone()).collect(),
        c_names: samples.iter().map(|s| s.c_name.clone()).collect(),
        image: stack(|s| &s.image)?,
        cloth: stack(|s| &s.cloth)?,
        cloth_mask: stack(|s| &s.cloth_mask)?,
        agnostic: stack(|s| &s.agnostic)?,
        pose_map: stack(|s| &s.pose_map)?,
        pose_vis: stack(|s| &s.pose_vis)?,
        head: stack(|s| &s.head)?,
        shape: stack(|s| &s.shape)?,
        parse_cloth: stack(|s| &s.parse_cloth)?,
        grid_image: stack(|s| &s.grid_image)?,
    })
}

pub struct TryonDataset {
    opts: DatasetOptions,
    pairs: Vec<PairEntry>,
    pose: Option<PoseEstimator>,
}

impl TryonDataset {
    /// Open the dataset: parse the pair manifest and keep the optional
    /// landmark estimator for pose derivation.
    pub fn open(opts: DatasetOptions, pose: Option<PoseEstimator>) -> Result<Self> {
        let pairs = read_pairs(&opts.data_list)?;
        if pairs.is_empty() {
            return Err(Error::Dataset(format!(
                "pair manifest {} names no samples",
                opts.data_list.display()
            )));
        }
        Ok(Self { opts, pairs, pose })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[PairEntry] {
        &self.pairs
    }

    pub fn options(&self) -> &DatasetOptions {
        &self.opts
    }

    fn dir(&self, sub: &str) -> PathBuf {
        self.opts.dataroot.join(&self.opts.datamode).join(sub)
    }

    /// Assemble the tensor bundle for sample `idx`.
    pub fn sample(&self, idx: usize) -> Result<SampleBundle> {
        let pair = self
            .pairs
            .get(idx)
            .ok_or_else(|| Error::Dataset(format!("sample index {idx} out of range")))?;
        let device = Device::Cpu;
        let (fw, fh) = (self.opts.fine_width as u32, self.opts.fine_height as u32);

        let person = load_rgb(&self.dir("image").join(&pair.person), fw, fh)?;
        let cloth_img = load_rgb(&self.dir("cloth").join(&pair.cloth), fw, fh)?;

        let mask_img = self.cloth_mask_for(pair, &cloth_img)?;
        let skeleton = self.skeleton_for(pair, &person)?;
        let parse = self.parse_for(pair, &skeleton)?;

        // Region masks from the parse map.
        let head_mask = mask_from(&parse, |l| ParseLabel::HEAD.contains(&l));
        let body_mask = mask_from(&parse, |l| l != ParseLabel::Background);

        let image = image_to_tensor(&person, &device).map_err(inference_err)?;
        let cloth = image_to_tensor(&cloth_img, &device).map_err(inference_err)?;
        let cloth_mask_t = mask_tensor(&mask_img, &device)?;

        let head = masked_image(&person, &head_mask, -1.0, &device)?;
        let cloth_region = mask_from(&parse, |l| ParseLabel::CLOTH.contains(&l));
        let parse_cloth = masked_image(&person, &cloth_region, 1.0, &device)?;
        let shape = shape_tensor(&body_mask, &device)?;

        let (pose_map, pose_vis) =
            pose_tensors(&skeleton, fw as usize, fh as usize, self.opts.radius, &device)?;

        let agnostic =
            Tensor::cat(&[&shape, &head, &pose_map], 0).map_err(inference_err)?;

        let grid_image = grid_reference(fw, fh, &device)?;

        Ok(SampleBundle {
            im_name: pair.person.clone(),
            c_name: pair.cloth.clone(),
            image,
            cloth,
            cloth_mask: cloth_mask_t,
            agnostic,
            pose_map,
            pose_vis,
            head,
            shape,
            parse_cloth,
            grid_image,
        })
    }

    fn cloth_mask_for(&self, pair: &PairEntry, cloth_img: &RgbImage) -> Result<GrayImage> {
        let path = self
            .dir("cloth-mask")
            .join(format!("{}.png", pair.cloth_stem()));
        if path.exists() {
            let mask = load_gray(&path, cloth_img.width(), cloth_img.height())?;
            return Ok(mask);
        }

        let gray = image::DynamicImage::ImageRgb8(cloth_img.clone()).to_luma8();
        let mask = cloth_mask(&gray);
        save_cached(&path, |p| mask.save(p))?;
        Ok(mask)
    }

    fn skeleton_for(&self, pair: &PairEntry, person: &RgbImage) -> Result<PoseSkeleton> {
        let pose_dir = self.dir("pose");
        let path = pose_dir.join(format!("{}_keypoints.json", pair.person_stem()));

        match &self.pose {
            Some(estimator) => estimator.estimate_cached(person, &pose_dir, pair.person_stem()),
            None if path.exists() => read_skeleton(&path),
            None => Err(Error::Dataset(format!(
                "no cached pose for {} and no landmark checkpoint configured",
                pair.person
            ))),
        }
    }

    fn parse_for(&self, pair: &PairEntry, skeleton: &PoseSkeleton) -> Result<GrayImage> {
        let path = self
            .dir("image-parse")
            .join(format!("{}.png", pair.person_stem()));
        let (fw, fh) = (self.opts.fine_width as u32, self.opts.fine_height as u32);

        if path.exists() {
            return load_gray(&path, fw, fh);
        }

        let parse = parse_from_pose(skeleton, fw, fh);
        save_cached(&path, |p| parse.save(p))?;
        Ok(parse)
    }
}

/// Decode by content, not extension; staged uploads keep whatever name
/// the client sent.
fn decode_image(path: &Path) -> Result<image::DynamicImage> {
    image::ImageReader::open(path)
        .map_err(|e| Error::io(path, e))?
        .with_guessed_format()
        .map_err(|e| Error::io(path, e))?
        .decode()
        .map_err(|e| Error::Image(format!("{}: {e}", path.display())))
}

fn load_rgb(path: &Path, width: u32, height: u32) -> Result<RgbImage> {
    let img = decode_image(path)?.to_rgb8();
    Ok(image::imageops::resize(
        &img,
        width,
        height,
        image::imageops::FilterType::Triangle,
    ))
}

fn load_gray(path: &Path, width: u32, height: u32) -> Result<GrayImage> {
    let img = decode_image(path)?.to_luma8();
    // Nearest keeps label/mask values exact.
    Ok(image::imageops::resize(
        &img,
        width,
        height,
        image::imageops::FilterType::Nearest,
    ))
}

fn save_cached<F>(path: &Path, save: F) -> Result<()>
where
    F: FnOnce(&Path) -> std::result::Result<(), image::ImageError>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    save(path).map_err(|e| Error::Image(format!("{}: {e}", path.display())))
}

fn mask_from<F: Fn(ParseLabel) -> bool>(parse: &GrayImage, keep: F) -> GrayImage {
    GrayImage::from_fn(parse.width(), parse.height(), |x, y| {
        if keep(ParseLabel::from_u8(parse.get_pixel(x, y)[0])) {
            image::Luma([255])
        } else {
            image::Luma([0])
        }
    })
}

fn mask_tensor(mask: &GrayImage, device: &Device) -> Result<Tensor> {
    vton_vision::mask_to_tensor(mask, device).map_err(inference_err)
}

/// Person pixels where the mask holds, `fill` elsewhere, `[3, h, w]`.
fn masked_image(
    person: &RgbImage,
    mask: &GrayImage,
    fill: f32,
    device: &Device,
) -> Result<Tensor> {
    let (w, h) = person.dimensions();
    let (w_us, h_us) = (w as usize, h as usize);
    let mut data = vec![fill; 3 * h_us * w_us];
    for (x, y, pixel) in person.enumerate_pixels() {
        if mask.get_pixel(x, y)[0] > 0 {
            let idx = y as usize * w_us + x as usize;
            for ch in 0..3 {
                data[ch * h_us * w_us + idx] = pixel[ch] as f32 / 127.5 - 1.0;
            }
        }
    }
    Tensor::from_vec(data, (3, h_us, w_us), device).map_err(inference_err)
}

/// Downsample-then-upsample body silhouette, `[1, h, w]` in [-1, 1].
fn shape_tensor(body_mask: &GrayImage, device: &Device) -> Result<Tensor> {
    let (w, h) = body_mask.dimensions();
    let small = image::imageops::resize(
        body_mask,
        (w / 16).max(1),
        (h / 16).max(1),
        image::imageops::FilterType::Triangle,
    );
    let blurred = image::imageops::resize(&small, w, h, image::imageops::FilterType::Triangle);

    let (w_us, h_us) = (w as usize, h as usize);
    let mut data = vec![0f32; h_us * w_us];
    for (x, y, pixel) in blurred.enumerate_pixels() {
        data[y as usize * w_us + x as usize] = pixel[0] as f32 / 127.5 - 1.0;
    }
    Tensor::from_vec(data, (1, h_us, w_us), device).map_err(inference_err)
}

/// Keypoint squares: one channel per keypoint plus their union.
fn pose_tensors(
    skeleton: &PoseSkeleton,
    width: usize,
    height: usize,
    radius: usize,
    device: &Device,
) -> Result<(Tensor, Tensor)> {
    let mut map = vec![-1f32; Keypoint::COUNT * height * width];
    let mut vis = vec![-1f32; height * width];
    let r = radius as i64;

    for (k, point) in skeleton.points.iter().enumerate() {
        if !point.is_present() {
            continue;
        }
        let (cx, cy) = (point.x.round() as i64, point.y.round() as i64);
        for y in (cy - r).max(0)..=(cy + r).min(height as i64 - 1) {
            for x in (cx - r).max(0)..=(cx + r).min(width as i64 - 1) {
                let idx = y as usize * width + x as usize;
                map[k * height * width + idx] = 1.0;
                vis[idx] = 1.0;
            }
        }
    }

    let pose_map = Tensor::from_vec(map, (Keypoint::COUNT, height, width), device)
        .map_err(inference_err)?;
    let pose_vis =
        Tensor::from_vec(vis, (1, height, width), device).map_err(inference_err)?;
    Ok((pose_map, pose_vis))
}

/// Synthesized checkerline reference the GMM stage warps for display.
fn grid_reference(width: u32, height: u32, device: &Device) -> Result<Tensor> {
    const STEP: u32 = 16;
    let img = RgbImage::from_fn(width, height, |x, y| {
        if x % STEP == 0 || y % STEP == 0 {
            image::Rgb([0, 0, 0])
        } else {
            image::Rgb([255, 255, 255])
        }
    });
    image_to_tensor(&img, device).map_err(inference_err)
}
