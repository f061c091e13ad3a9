// src/autograd.rs
use ndarray::prelude::*;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::rc::Rc;

// 梯度模式按线程隔离（构图只发生在调用线程上；
// rayon 工作线程只做纯数组计算，不会创建 Tensor）
thread_local! {
    static NO_GRAD_DEPTH: Cell<usize> = Cell::new(0);
    static INFERENCE_MODE: Cell<bool> = Cell::new(false);
}

pub struct NoGradGuard {
    _priv: (),
}

impl NoGradGuard {
    pub fn enter() -> Self {
        NO_GRAD_DEPTH.with(|d| d.set(d.get() + 1));
        Self { _priv: () }
    }
}

impl Drop for NoGradGuard {
    fn drop(&mut self) {
        NO_GRAD_DEPTH.with(|d| d.set(d.get() - 1));
    }
}

/// 开/关 推理模式（train_mode/eval_mode 调用它）
pub fn set_inference_mode(on: bool) {
    INFERENCE_MODE.with(|m| m.set(on));
}

#[inline]
pub fn is_inference_mode() -> bool {
    INFERENCE_MODE.with(|m| m.get())
}

/// no_grad 的判定：
/// - 在 NoGradGuard 作用域内为 true
/// - 或者处于 inference_mode 为 true
#[inline]
pub fn is_no_grad() -> bool {
    NO_GRAD_DEPTH.with(|d| d.get()) > 0 || is_inference_mode()
}

/// 便利封装：no_grad(|| { ... })
pub fn no_grad<R>(f: impl FnOnce() -> R) -> R {
    let _g = NoGradGuard::enter();
    f()
}

pub struct TensorData {
    pub data: ArrayD<f32>,
    pub grad: Option<ArrayD<f32>>,
    pub parents: Vec<Tensor>,
    pub backward_op: Option<Box<dyn Fn(&ArrayD<f32>)>>,
    pub requires_grad: bool,
}

#[derive(Clone)]
pub struct Tensor(pub(crate) Rc<RefCell<TensorData>>);

impl Tensor {
    /// 默认构造叶子张量：requires_grad 跟随全局模式
    pub fn new(data: ArrayD<f32>) -> Self {
        let req = !is_no_grad();
        Tensor::from_data_with_grad_flag(data, req)
    }

    /// 创建叶子张量（显式指定 requires_grad）
    pub fn from_data_with_grad_flag(data: ArrayD<f32>, requires_grad: bool) -> Tensor {
        Tensor(Rc::new(RefCell::new(TensorData {
            data,
            grad: None,
            parents: Vec::new(),
            backward_op: None,
            requires_grad,
        })))
    }

    /// 推理/常量：不需要梯度
    pub fn from_data_no_grad(data: ArrayD<f32>) -> Tensor {
        Tensor::from_data_with_grad_flag(data, false)
    }

    /// 训练参数：需要梯度（叶子）
    pub fn parameter(data: ArrayD<f32>) -> Tensor {
        Tensor::from_data_with_grad_flag(data, true)
    }

    /// 获取数据的只读引用（零拷贝）
    pub fn data_ref(&self) -> Ref<'_, ArrayD<f32>> {
        Ref::map(self.0.borrow(), |t| &t.data)
    }

    /// 获取梯度的只读引用（零拷贝）
    pub fn grad_ref(&self) -> Ref<'_, Option<ArrayD<f32>>> {
        Ref::map(self.0.borrow(), |t| &t.grad)
    }

    /// 获取数据的可变引用
    pub fn data_mut(&self) -> RefMut<'_, ArrayD<f32>> {
        RefMut::map(self.0.borrow_mut(), |t| &mut t.data)
    }

    pub fn data(&self) -> ArrayD<f32> {
        self.0.borrow().data.clone()
    }

    pub fn grad(&self) -> Option<ArrayD<f32>> {
        self.0.borrow().grad.clone()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.0.borrow().data.shape().to_vec()
    }

    /// 标量张量取值（loss 等 0 维结果）
    pub fn item(&self) -> f32 {
        let inner = self.0.borrow();
        assert_eq!(
            inner.data.len(),
            1,
            "item() expects a scalar tensor, got shape {:?}",
            inner.data.shape()
        );
        *inner.data.first().unwrap()
    }

    #[inline]
    pub fn requires_grad(&self) -> bool {
        self.0.borrow().requires_grad
    }

    pub fn zero_grad(&self) {
        self.0.borrow_mut().grad = None;
    }

    pub fn reshape(&self, shape: Vec<i32>) -> Tensor {
        crate::ops::shape::reshape(self, shape)
    }

    /// 梯度累加。形状必须与 data 一致（broadcast 的归约在各 op 内完成）
    pub fn add_grad(&self, grad: ArrayD<f32>) {
        let mut inner = self.0.borrow_mut();

        if inner.data.shape() != grad.shape() {
            panic!(
                "Gradient shape mismatch! data: {:?}, grad: {:?}",
                inner.data.shape(),
                grad.shape()
            );
        }

        if let Some(existing) = &inner.grad {
            inner.grad = Some(existing + &grad);
        } else {
            inner.grad = Some(grad);
        }
    }

    /// 反向传播：拓扑排序后逆序执行每个节点的 backward_op
    pub fn backward(&self) {
        let mut topo = Vec::new();
        let mut visited = HashSet::new();

        fn build_topo(
            node: &Tensor,
            topo: &mut Vec<Tensor>,
            visited: &mut HashSet<*const TensorData>,
        ) {
            let ptr = node.0.as_ptr() as *const TensorData;
            if visited.contains(&ptr) {
                return;
            }
            visited.insert(ptr);

            for parent in &node.0.borrow().parents {
                build_topo(parent, topo, visited);
            }
            topo.push(node.clone());
        }

        build_topo(self, &mut topo, &mut visited);

        // 种子梯度：dL/dL = 1
        let seed_shape = self.data_ref().shape().to_vec();
        self.add_grad(ArrayD::ones(seed_shape));

        for node in topo.iter().rev() {
            let inner = node.0.borrow();
            if let (Some(grad), Some(op)) = (&inner.grad, &inner.backward_op) {
                op(grad);
            }
        }
    }

    /// detach：数据拷贝，requires_grad=false，无 parents/backward_op
    pub fn detach(&self) -> Tensor {
        let d = self.0.borrow().data.clone();
        Tensor::from_data_with_grad_flag(d, false)
    }
}
